//! The duplex streaming pipeline.
//!
//! Data moves through two rings. USB-OUT packets land in the received
//! ring; every output cycle the mix-output task drains one cycle's worth,
//! blends in the resampled input mix, and publishes the result to the
//! playback sinks. Captured input lands in the input-mix ring on a fixed
//! cadence and is drained from two independent cursors, one feeding the
//! output mix and one feeding USB-IN packets.
//!
//! All six jobs run as scheduler tasks and may execute on either core.
//! Shared state is split by role: cursors and small published values are
//! atomics, ring storage and task-private state live in [`cell`] types
//! whose accessors state the ownership rule that makes them sound.

mod adapter;
mod cell;
mod stats;


pub use adapter::{CaptureSource, PlaybackSink};
pub use stats::StreamStats;

use core::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};

use crate::config::{
    samples_for_duration, DEVICE_BUFFER_MS, INPUT_CHANNELS, INPUT_FETCH_SCRATCH,
    INPUT_MIX_BUFFER_MS, INPUT_MIX_CYCLE_MS, INPUT_MIX_RING_CAPACITY, MAX_SAMPLING_FREQUENCY,
    OUTPUT_CHANNELS, OUTPUT_CHARGE_CYCLES, OUTPUT_CYCLE_SCRATCH, OUTPUT_MIX_CYCLE_MS,
    RX_RING_CAPACITY, USB_PACKET_STAGING,
};
use crate::dsp::{bits_to_bytes, FormatError};
use crate::mix::{Mixer, MixerConfig};
use crate::resample::{Resampler, ResamplerConfig};
use crate::ring::RingRegion;
use crate::sched::{Scheduler, TaskId, CORE_ANY};
use cell::{RingBytes, TaskCell};
use stats::Counters;

const MIX_OUT: TaskId = TaskId::new(0);
const OUT_ANALOG: TaskId = TaskId::new(1);
const OUT_DIGITAL: TaskId = TaskId::new(2);
const MIX_IN: TaskId = TaskId::new(3);
const IN_LINE: TaskId = TaskId::new(4);
const IN_DIGITAL: TaskId = TaskId::new(5);
const TASK_COUNT: usize = 6;

const FETCH_TASKS: [TaskId; 2] = [IN_LINE, IN_DIGITAL];

/// Whether the DSP accelerator paths are available on this build target.
const ACCEL: bool = cfg!(all(target_arch = "arm", target_feature = "dsp"));

/// Volume slots addressable from the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    LineIn = 0,
    DigitalIn = 1,
    UsbStream = 2,
    MixedInput = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutPhase {
    Init,
    Process,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InPhase {
    Init,
    Fetch,
}

/// Private state of the mix-output task.
struct MixOutState {
    phase: OutPhase,
    sample_bytes: usize,
    cycle_bytes: usize,
    mixer: Mixer,
    resampler: Resampler,
    /// Cycle scratch, first for the received data and then for the
    /// resampled input mix.
    data: [u8; OUTPUT_CYCLE_SCRATCH],
}

/// Private state of the mix-input task.
struct MixInState {
    phase: InPhase,
    deadline: u64,
    require_samples: u32,
    cycle_bytes: usize,
    mixer: Mixer,
}

/// Mixed output published by the mix-output task to both write tasks.
struct OutShared {
    buf: TaskCell<[u8; OUTPUT_CYCLE_SCRATCH]>,
    len: AtomicUsize,
    require_samples: AtomicU32,
}

/// Per-source handoff between a fetch task and the mix-input task.
struct FetchShared {
    buf: TaskCell<[u8; INPUT_FETCH_SCRATCH]>,
    /// Bytes fetched this quantum; zero while the fetch is outstanding.
    result: AtomicU32,
    require_samples: AtomicU32,
}

impl FetchShared {
    const fn new() -> Self {
        Self {
            buf: TaskCell::new([0; INPUT_FETCH_SCRATCH]),
            result: AtomicU32::new(0),
            require_samples: AtomicU32::new(0),
        }
    }
}

/// The streaming core: rings, mixers and the six jobs moving audio
/// between the USB endpoints and the physical adapters.
pub struct Pipeline<LI, DI, AO, DO> {
    sched: Scheduler<TASK_COUNT>,

    line_in: LI,
    digital_in: DI,
    analog_out: AO,
    digital_out: DO,

    rx_store: RingBytes<RX_RING_CAPACITY>,
    rx_size: AtomicUsize,
    rx_write: AtomicUsize,
    rx_read: AtomicUsize,

    input_store: RingBytes<INPUT_MIX_RING_CAPACITY>,
    input_size: AtomicUsize,
    input_write: AtomicUsize,
    /// Read cursor of the USB-IN packet drain.
    input_pop_read: AtomicUsize,
    /// Read cursor of the output-mix drain.
    input_out_read: AtomicUsize,

    out_freq: AtomicU32,
    out_bits: AtomicU8,
    in_freq: AtomicU32,
    in_bits: AtomicU8,

    /// Output cycles left before the sinks are started.
    charge: AtomicU8,
    volumes: [AtomicU8; 4],

    mix_out: TaskCell<MixOutState>,
    out_shared: OutShared,
    mix_in: TaskCell<MixInState>,
    fetch: [FetchShared; 2],
    /// USB-IN staging; re-emitted as-is when the input ring runs dry.
    staging: TaskCell<[u8; USB_PACKET_STAGING]>,

    stats: Counters,
}

fn check_format(freq: u32, bits: u8) -> Result<(), FormatError> {
    if freq == 0 || freq > MAX_SAMPLING_FREQUENCY {
        return Err(FormatError::ZeroFrequency);
    }
    match bits {
        16 | 20 | 24 | 32 => Ok(()),
        _ => Err(FormatError::UnsupportedBits {
            src: bits,
            dst: bits,
        }),
    }
}

impl<LI, DI, AO, DO> Pipeline<LI, DI, AO, DO>
where
    LI: CaptureSource,
    DI: CaptureSource,
    AO: PlaybackSink,
    DO: PlaybackSink,
{
    pub fn new(line_in: LI, digital_in: DI, analog_out: AO, digital_out: DO, clock: fn() -> u64) -> Self {
        Self {
            sched: Scheduler::new(clock),
            line_in,
            digital_in,
            analog_out,
            digital_out,
            rx_store: RingBytes::new(),
            rx_size: AtomicUsize::new(0),
            rx_write: AtomicUsize::new(0),
            rx_read: AtomicUsize::new(0),
            input_store: RingBytes::new(),
            input_size: AtomicUsize::new(0),
            input_write: AtomicUsize::new(0),
            input_pop_read: AtomicUsize::new(0),
            input_out_read: AtomicUsize::new(0),
            out_freq: AtomicU32::new(0),
            out_bits: AtomicU8::new(0),
            in_freq: AtomicU32::new(0),
            in_bits: AtomicU8::new(0),
            charge: AtomicU8::new(0),
            volumes: [
                AtomicU8::new(0xff),
                AtomicU8::new(0xff),
                AtomicU8::new(0xff),
                AtomicU8::new(0xff),
            ],
            mix_out: TaskCell::new(MixOutState {
                phase: OutPhase::Init,
                sample_bytes: 0,
                cycle_bytes: 0,
                mixer: Mixer::new(),
                resampler: Resampler::new(),
                data: [0; OUTPUT_CYCLE_SCRATCH],
            }),
            out_shared: OutShared {
                buf: TaskCell::new([0; OUTPUT_CYCLE_SCRATCH]),
                len: AtomicUsize::new(0),
                require_samples: AtomicU32::new(0),
            },
            mix_in: TaskCell::new(MixInState {
                phase: InPhase::Init,
                deadline: 0,
                require_samples: 0,
                cycle_bytes: 0,
                mixer: Mixer::new(),
            }),
            fetch: [FetchShared::new(), FetchShared::new()],
            staging: TaskCell::new([0; USB_PACKET_STAGING]),
            stats: Counters::default(),
        }
    }

    /// Pins every task to both cores and brings the pipeline up at the
    /// default 48 kHz / 16-bit formats.
    pub fn init(&self) -> Result<(), FormatError> {
        for index in 0..TASK_COUNT as u8 {
            self.sched.set_affinity(TaskId::new(index), CORE_ANY);
        }
        self.set_rx_format(48_000, 16)?;
        self.set_tx_format(48_000, 16)?;
        Ok(())
    }

    /// Runs at most one due task eligible for `core_mask`. Each core's
    /// main loop calls this continuously.
    pub fn run_once(&self, core_mask: u8) -> Option<TaskId> {
        self.sched.run_one(core_mask, |id| self.dispatch(id))
    }

    fn dispatch(&self, id: TaskId) {
        match id.index() {
            0 => self.task_mix_out(),
            1 => self.task_write_out(OUT_ANALOG, &self.analog_out),
            2 => self.task_write_out(OUT_DIGITAL, &self.digital_out),
            3 => self.task_mix_in(),
            4 => self.task_fetch(0, &self.line_in),
            _ => self.task_fetch(1, &self.digital_in),
        }
    }

    fn rx_region(&self) -> RingRegion {
        RingRegion::with_size(RX_RING_CAPACITY, self.rx_size.load(Ordering::Relaxed))
    }

    fn input_region(&self) -> RingRegion {
        RingRegion::with_size(
            INPUT_MIX_RING_CAPACITY,
            self.input_size.load(Ordering::Relaxed),
        )
    }

    fn volume(&self, role: Role) -> u8 {
        self.volumes[role as usize].load(Ordering::Relaxed)
    }

    pub fn set_volume(&self, role: Role, volume: u8) {
        self.volumes[role as usize].store(volume, Ordering::Relaxed);
    }

    pub fn get_volume(&self, role: Role) -> u8 {
        self.volume(role)
    }

    pub fn stats(&self) -> StreamStats {
        self.stats.snapshot()
    }

    /// Occupied and total bytes of the received ring, for feedback
    /// endpoint computation.
    pub fn rx_buffer_status(&self) -> (usize, usize) {
        let region = self.rx_region();
        let write = self.rx_write.load(Ordering::Relaxed);
        let read = self.rx_read.load(Ordering::Relaxed);
        (region.distance(write, read), region.size())
    }

    fn stop_task(&self, id: TaskId) {
        self.sched.deactivate(id);
        self.sched.wait_done(id);
    }

    /// Reconfigures the USB-OUT side. Restarts the output tasks and
    /// withholds sink start-up for the charge period.
    pub fn set_rx_format(&self, freq: u32, bits: u8) -> Result<(), FormatError> {
        self.charge.store(OUTPUT_CHARGE_CYCLES, Ordering::Relaxed);
        if freq == self.out_freq.load(Ordering::Relaxed) && bits == self.out_bits.load(Ordering::Relaxed)
        {
            return Ok(());
        }
        check_format(freq, bits)?;
        log::info!(target: "stream", "rx format {freq} Hz / {bits} bit");

        self.stop_task(MIX_OUT);
        self.stop_task(OUT_ANALOG);
        self.stop_task(OUT_DIGITAL);
        self.analog_out.stop();
        self.digital_out.stop();

        self.out_freq.store(freq, Ordering::Relaxed);
        self.out_bits.store(bits, Ordering::Relaxed);
        let size = samples_for_duration(DEVICE_BUFFER_MS, freq, OUTPUT_CHANNELS)
            * bits_to_bytes(bits as u32);
        // A partial frame at the wrap would never be consumed; round the
        // window down to a whole frame.
        let frame = OUTPUT_CHANNELS as usize * bits_to_bytes(bits as u32);
        self.rx_size.store(size - size % frame, Ordering::Relaxed);
        self.rx_write.store(0, Ordering::Relaxed);
        self.rx_read.store(0, Ordering::Relaxed);

        self.analog_out.set_format(freq, bits);
        self.digital_out.set_format(freq, bits);
        self.update_output_mixer()?;

        self.restart_output_tasks();
        Ok(())
    }

    /// Reconfigures the USB-IN side. The output mixer consumes the input
    /// ring, so the output tasks are cycled here as well.
    pub fn set_tx_format(&self, freq: u32, bits: u8) -> Result<(), FormatError> {
        if freq == self.in_freq.load(Ordering::Relaxed) && bits == self.in_bits.load(Ordering::Relaxed)
        {
            return Ok(());
        }
        check_format(freq, bits)?;
        log::info!(target: "stream", "tx format {freq} Hz / {bits} bit");

        self.stop_task(MIX_IN);
        self.stop_task(IN_LINE);
        self.stop_task(IN_DIGITAL);
        self.stop_task(MIX_OUT);
        self.stop_task(OUT_ANALOG);
        self.stop_task(OUT_DIGITAL);
        self.line_in.stop();
        self.digital_in.stop();

        self.in_freq.store(freq, Ordering::Relaxed);
        self.in_bits.store(bits, Ordering::Relaxed);
        let size = samples_for_duration(INPUT_MIX_BUFFER_MS, freq, INPUT_CHANNELS)
            * bits_to_bytes(bits as u32);
        let frame = INPUT_CHANNELS as usize * bits_to_bytes(bits as u32);
        self.input_size.store(size - size % frame, Ordering::Relaxed);
        self.input_write.store(0, Ordering::Relaxed);
        self.input_pop_read.store(0, Ordering::Relaxed);
        self.input_out_read.store(0, Ordering::Relaxed);

        self.line_in.set_format(freq, bits);
        self.digital_in.set_format(freq, bits);
        self.line_in.start();
        self.digital_in.start();

        // SAFETY: the mix-input task is stopped.
        let st = unsafe { self.mix_in.get() };
        st.mixer.setup(&MixerConfig {
            bits,
            stride: bits_to_bytes(bits as u32) as u8,
            channels: INPUT_CHANNELS,
            accel: ACCEL,
        })?;
        st.phase = InPhase::Init;
        self.update_output_mixer()?;

        // Fetches stay no-ops until the mix-input task publishes the new
        // quantum requirement.
        for shared in &self.fetch {
            shared.require_samples.store(0, Ordering::Relaxed);
            shared.result.store(0, Ordering::Relaxed);
        }
        self.sched.activate(IN_LINE);
        self.sched.activate(IN_DIGITAL);
        self.sched.activate(MIX_IN);
        self.sched.set_pending(MIX_IN);
        self.restart_output_tasks();
        Ok(())
    }

    /// Host closed the playback stream.
    pub fn close_rx(&self) {
        self.analog_out.stop();
        self.digital_out.stop();
    }

    /// Host closed the capture stream. Capture keeps running into the
    /// input ring so the output mix is unaffected.
    pub fn close_tx(&self) {}

    /// Rebinds the output mixer and the input-to-output resampler.
    /// Caller must have stopped the mix-output task.
    fn update_output_mixer(&self) -> Result<(), FormatError> {
        let out_freq = self.out_freq.load(Ordering::Relaxed);
        let out_bits = self.out_bits.load(Ordering::Relaxed);
        let in_freq = self.in_freq.load(Ordering::Relaxed);
        let in_bits = self.in_bits.load(Ordering::Relaxed);

        // SAFETY: the mix-output task is stopped.
        let st = unsafe { self.mix_out.get() };
        st.mixer.setup(&MixerConfig {
            bits: out_bits,
            stride: bits_to_bytes(out_bits as u32) as u8,
            channels: OUTPUT_CHANNELS,
            accel: ACCEL,
        })?;
        // The input side is unconfigured until the first tx format
        // arrives; the output mix runs without it until then.
        if in_freq != 0 {
            st.resampler.setup(&ResamplerConfig {
                src_bits: in_bits,
                src_stride: bits_to_bytes(in_bits as u32) as u8,
                src_freq: in_freq,
                dst_bits: out_bits,
                dst_stride: bits_to_bytes(out_bits as u32) as u8,
                dst_freq: out_freq,
                channels: OUTPUT_CHANNELS,
                accel: ACCEL,
            })?;
        }
        Ok(())
    }

    fn restart_output_tasks(&self) {
        // SAFETY: the mix-output task is stopped.
        unsafe { self.mix_out.get() }.phase = OutPhase::Init;
        self.out_shared.len.store(0, Ordering::Relaxed);
        self.out_shared.require_samples.store(0, Ordering::Relaxed);
        self.sched.activate(OUT_ANALOG);
        self.sched.activate(OUT_DIGITAL);
        self.sched.activate(MIX_OUT);
        self.sched.set_pending(MIX_OUT);
    }

    /// Accepts one USB-OUT packet. `fill` is called once per contiguous
    /// span of the ring until `len` bytes are written.
    ///
    /// The writer does not clamp against the read cursor; the host's rate
    /// is authoritative and a stalled consumer is overwritten.
    pub fn push_rx_data(&self, len: usize, mut fill: impl FnMut(&mut [u8])) {
        let region = self.rx_region();
        if region.size() == 0 {
            return;
        }
        // SAFETY: single writer of the received ring; the mix-output task
        // only reads behind the write cursor published below.
        let storage = unsafe { self.rx_store.bytes_mut() };
        let mut pos = self.rx_write.load(Ordering::Relaxed);
        let mut remaining = len;
        while remaining > 0 {
            let span = region.distance_to_end(pos).min(remaining);
            fill(&mut storage[pos..pos + span]);
            pos = region.advance_free(pos, span);
            remaining -= span;
        }
        self.rx_write.store(pos, Ordering::Release);
        self.stats.received_bytes.fetch_add(len as u32, Ordering::Relaxed);
        self.sched.set_pending(MIX_OUT);
    }

    /// Emits one USB-IN packet (1 ms of input mix). When the input ring
    /// has not accumulated a fresh packet the previous one is re-sent,
    /// which keeps the endpoint fed at the cost of a repeated millisecond.
    pub fn pop_tx_data(&self, emit: impl FnOnce(&[u8])) -> usize {
        let freq = self.in_freq.load(Ordering::Relaxed);
        let bits = self.in_bits.load(Ordering::Relaxed);
        let packet =
            (freq / 1000) as usize * bits_to_bytes(bits as u32) * INPUT_CHANNELS as usize;

        // SAFETY: only the USB-IN completion context calls this.
        let staging = unsafe { self.staging.get() };
        let region = self.input_region();
        let write = self.input_write.load(Ordering::Acquire);
        let read = self.input_pop_read.load(Ordering::Relaxed);
        if region.distance(write, read) > packet {
            // SAFETY: reading behind the write cursor acquired above.
            let storage = unsafe { self.input_store.bytes() };
            let pos = region.copy_to_free(storage, read, &mut staging[..packet]);
            self.input_pop_read.store(pos, Ordering::Relaxed);
        } else {
            log::debug!(target: "stream", "tx stream exhausted");
        }
        self.stats
            .transferred_bytes
            .fetch_add(packet as u32, Ordering::Relaxed);
        emit(&staging[..packet]);
        packet
    }

    fn task_mix_out(&self) {
        // SAFETY: this is the owning task.
        let st = unsafe { self.mix_out.get() };
        match st.phase {
            OutPhase::Init => {
                let freq = self.out_freq.load(Ordering::Relaxed);
                let bits = self.out_bits.load(Ordering::Relaxed);
                st.sample_bytes = bits_to_bytes(bits as u32);
                st.cycle_bytes = samples_for_duration(OUTPUT_MIX_CYCLE_MS, freq, OUTPUT_CHANNELS)
                    * st.sample_bytes;
                st.phase = OutPhase::Process;
                self.sched.set_pending(MIX_OUT);
            }
            OutPhase::Process => self.mix_out_cycle(st),
        }
    }

    fn mix_out_cycle(&self, st: &mut MixOutState) {
        // The write tasks read the shared buffer; wait until both are done
        // with the previous cycle before overwriting it.
        if !self.sched.is_idle(OUT_ANALOG) || !self.sched.is_idle(OUT_DIGITAL) {
            self.sched.set_pending_delay_us(MIX_OUT, 100);
            return;
        }

        let cycle = st.cycle_bytes;
        let sample_bytes = st.sample_bytes;
        let rx = self.rx_region();
        let rx_write = self.rx_write.load(Ordering::Acquire);
        let rx_read = self.rx_read.load(Ordering::Relaxed);
        if rx.distance(rx_write, rx_read) < cycle {
            self.sched.set_pending_delay_us(MIX_OUT, 200);
            return;
        }

        let MixOutState {
            mixer,
            resampler,
            data,
            ..
        } = st;

        // SAFETY: reading behind the write cursor acquired above.
        let rx_storage = unsafe { self.rx_store.bytes() };
        let pos = rx.copy_to_free(rx_storage, rx_read, &mut data[..cycle]);
        self.rx_read.store(pos, Ordering::Release);

        // SAFETY: both write tasks are idle and stay parked until pended.
        let mix_buf = unsafe { self.out_shared.buf.get() };
        mixer.apply(
            self.volume(Role::UsbStream),
            &data[..cycle],
            &mut mix_buf[..cycle],
            true,
        );

        let input = self.input_region();
        let in_write = self.input_write.load(Ordering::Acquire);
        let in_read = self.input_out_read.load(Ordering::Relaxed);
        let available = input.distance(in_write, in_read);
        let ready = resampler.config().src_freq != 0;
        if ready && resampler.required_src_bytes(cycle as u32) as usize <= available {
            // SAFETY: reading behind the write cursor acquired above.
            let in_storage = unsafe { self.input_store.bytes() };
            let mut dst_off = 0;
            let pos = input.apply_linear(in_storage, in_write, in_read, &mut |span: &[u8]| {
                let adv = resampler.apply(span, &mut data[dst_off..cycle]);
                dst_off += adv.dst_bytes;
                adv.src_bytes
            });
            self.input_out_read.store(pos, Ordering::Relaxed);
            mixer.apply(
                self.volume(Role::MixedInput),
                &data[..dst_off],
                &mut mix_buf[..dst_off],
                false,
            );
        } else {
            log::debug!(target: "stream", "input mix exhausted");
            self.stats.output_skips.fetch_add(1, Ordering::Relaxed);
        }

        self.out_shared
            .require_samples
            .store((cycle / sample_bytes) as u32, Ordering::Relaxed);
        self.out_shared.len.store(cycle, Ordering::Release);
        self.stats.output_cycles.fetch_add(1, Ordering::Relaxed);
        self.sched.set_pending(OUT_ANALOG);
        self.sched.set_pending(OUT_DIGITAL);

        let _ = self
            .charge
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| c.checked_sub(1));
        self.sched.set_pending_delay_us(MIX_OUT, 100);
    }

    fn task_write_out(&self, id: TaskId, sink: &dyn PlaybackSink) {
        let running = sink.is_running();
        let require = self.out_shared.require_samples.load(Ordering::Relaxed) as usize;
        if running && require > sink.free_samples() {
            self.sched.set_pending_delay_us(id, 200);
            return;
        }
        let len = self.out_shared.len.load(Ordering::Acquire);
        // SAFETY: the producer parks until this task goes idle again.
        let buf = unsafe { self.out_shared.buf.get_ref() };
        sink.write(&buf[..len]);
        // Starting only after the charge cycles leaves half a device
        // buffer queued ahead of the consumer.
        if self.charge.load(Ordering::Relaxed) == 0 && !running {
            sink.start();
        }
    }

    fn task_mix_in(&self) {
        // SAFETY: this is the owning task.
        let st = unsafe { self.mix_in.get() };
        match st.phase {
            InPhase::Init => {
                let freq = self.in_freq.load(Ordering::Relaxed);
                let bits = self.in_bits.load(Ordering::Relaxed);
                self.input_write.store(0, Ordering::Release);
                st.require_samples =
                    samples_for_duration(INPUT_MIX_CYCLE_MS, freq, INPUT_CHANNELS) as u32;
                st.cycle_bytes = st.require_samples as usize * bits_to_bytes(bits as u32);
                st.deadline = self.sched.now();
                for shared in &self.fetch {
                    shared.require_samples.store(st.require_samples, Ordering::Relaxed);
                    shared.result.store(0, Ordering::Relaxed);
                }
                st.phase = InPhase::Fetch;
                for id in FETCH_TASKS {
                    self.sched.set_pending(id);
                }
                self.sched.set_pending(MIX_IN);
            }
            InPhase::Fetch => self.mix_in_cycle(st),
        }
    }

    fn mix_in_cycle(&self, st: &mut MixInState) {
        // Before the quantum deadline, keep chasing sources that have not
        // produced yet. Once the deadline passes the quantum closes with
        // whatever arrived; slow sources drop out rather than stalling the
        // cadence.
        if self.sched.now() < st.deadline {
            let mut all_done = true;
            for (shared, id) in self.fetch.iter().zip(FETCH_TASKS) {
                let result = shared.result.load(Ordering::Relaxed);
                let idle = self.sched.is_idle(id);
                if result == 0 && idle {
                    self.sched.set_pending(id);
                }
                all_done &= result > 0 && idle;
            }
            if !all_done {
                self.sched.set_pending_delay_us(MIX_IN, 200);
                return;
            }
        }
        st.deadline += INPUT_MIX_CYCLE_MS as u64 * 1000;

        let region = self.input_region();
        let write = self.input_write.load(Ordering::Relaxed);
        // SAFETY: single writer of the input ring; both read cursors stay
        // behind the write cursor published below.
        let storage = unsafe { self.input_store.bytes_mut() };
        let mut overwrite = true;
        let roles = [Role::LineIn, Role::DigitalIn];
        for ((shared, id), role) in self.fetch.iter().zip(FETCH_TASKS).zip(roles) {
            let produced = shared.result.load(Ordering::Acquire) as usize;
            // A fetch that straddled the deadline may still be writing its
            // buffer; that data waits for the next quantum.
            if produced == 0 || !self.sched.is_idle(id) {
                continue;
            }
            // SAFETY: the fetch task is idle and its result store ordered
            // the buffer writes before this read.
            let buf = unsafe { shared.buf.get_ref() };
            mix_span_into_ring(
                &st.mixer,
                &region,
                storage,
                write,
                self.volume(role),
                &buf[..produced],
                overwrite,
            );
            overwrite = false;
        }

        // The cursor advances by a full quantum regardless of what the
        // sources delivered; input and output rates stay decoupled.
        let pos = region.advance_free(write, st.cycle_bytes);
        self.input_write.store(pos, Ordering::Release);
        self.stats.input_cycles.fetch_add(1, Ordering::Relaxed);

        for (shared, id) in self.fetch.iter().zip(FETCH_TASKS) {
            shared.result.store(0, Ordering::Release);
            self.sched.set_pending(id);
        }
        self.sched.set_pending(MIX_IN);
    }

    fn task_fetch(&self, index: usize, source: &dyn CaptureSource) {
        let shared = &self.fetch[index];
        let require = shared.require_samples.load(Ordering::Relaxed);
        if require == 0 || !source.is_active() || !source.has_samples(require) {
            return;
        }
        let bits = self.in_bits.load(Ordering::Relaxed);
        let cycle = require as usize * bits_to_bytes(bits as u32);
        // SAFETY: this is the owning task; the mix-input task reads the
        // buffer only after the result store below.
        let buf = unsafe { shared.buf.get() };
        let fetched = source.fetch(&mut buf[..cycle]);
        shared.result.store(fetched as u32, Ordering::Release);
    }
}

/// Mixes `src` into the ring at `pos`, span by span across the wrap.
fn mix_span_into_ring(
    mixer: &Mixer,
    region: &RingRegion,
    storage: &mut [u8],
    mut pos: usize,
    volume: u8,
    src: &[u8],
    overwrite: bool,
) {
    let size = region.size();
    let mut consumed = 0;
    while consumed < src.len() {
        let adv = mixer.apply(volume, &src[consumed..], &mut storage[pos..size], overwrite);
        if adv.src_bytes == 0 {
            break;
        }
        consumed += adv.src_bytes;
        pos = region.advance_free(pos, adv.dst_bytes);
    }
}
