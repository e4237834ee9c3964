//! Cooperative dual-core task scheduler.
//!
//! A fixed arena of task slots plus an index-linked run list kept in
//! insertion order. Each core polls [`Scheduler::run_one`] in its idle loop;
//! at most one ready task is dispatched per call and every task runs to
//! completion, so tasks chunk their own work and re-arm themselves instead
//! of blocking. There are no priorities; ready tasks dispatch in the order
//! they entered the run list.
//!
//! The run list is the only shared structure guarded by a lock (a
//! `critical-section` critical section, which the bound implementation makes
//! safe against both the other core and interrupts). Task bodies always
//! execute outside it.

use core::cell::RefCell;
use core::hint;

use critical_section::Mutex;

/// Core 0 affinity bit.
pub const CORE0: u8 = 0b01;
/// Core 1 affinity bit.
pub const CORE1: u8 = 0b10;
/// Runs on whichever core gets to it first.
pub const CORE_ANY: u8 = CORE0 | CORE1;

/// Index of a task slot in the scheduler arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskId(u8);

impl TaskId {
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Default, Clone, Copy)]
struct Slot {
    active: bool,
    pending: bool,
    /// Deactivation requested while the task was mid-run; honored when the
    /// run completes.
    removed: bool,
    queued: bool,
    /// Core mask of an in-flight run, 0 when idle.
    running: u8,
    affinity: u8,
    /// Earliest dispatch time in microseconds, 0 meaning immediately.
    at: u64,
}

struct State<const N: usize> {
    slots: [Slot; N],
    /// Slot indices in insertion order; the first `len` entries are live.
    order: [u8; N],
    len: usize,
}

impl<const N: usize> State<N> {
    fn push_tail(&mut self, id: usize) {
        debug_assert!(self.len < N);
        self.order[self.len] = id as u8;
        self.len += 1;
        self.slots[id].queued = true;
    }

    fn unlink_at(&mut self, pos: usize) {
        debug_assert!(pos < self.len);
        let id = self.order[pos] as usize;
        self.order.copy_within(pos + 1..self.len, pos);
        self.len -= 1;
        self.slots[id].queued = false;
    }

    fn position(&self, id: usize) -> Option<usize> {
        self.order[..self.len].iter().position(|&x| x as usize == id)
    }
}

/// Dual-core cooperative scheduler over `N` task slots.
pub struct Scheduler<const N: usize> {
    state: Mutex<RefCell<State<N>>>,
    /// Monotonic microsecond clock.
    clock: fn() -> u64,
}

impl<const N: usize> Scheduler<N> {
    pub fn new(clock: fn() -> u64) -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                slots: [Slot {
                    affinity: CORE_ANY,
                    ..Slot::default()
                }; N],
                order: [0; N],
                len: 0,
            })),
            clock,
        }
    }

    pub fn now(&self) -> u64 {
        (self.clock)()
    }

    pub fn set_affinity(&self, id: TaskId, mask: u8) {
        critical_section::with(|cs| {
            self.state.borrow_ref_mut(cs).slots[id.index()].affinity = mask;
        });
    }

    /// Enters the task into the run list. Idempotent; also cancels a
    /// deferred deactivation that has not been honored yet.
    pub fn activate(&self, id: TaskId) {
        critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            st.slots[id.index()].active = true;
            st.slots[id.index()].removed = false;
            if !st.slots[id.index()].queued && st.slots[id.index()].running == 0 {
                st.push_tail(id.index());
            }
        });
    }

    /// Removes the task from the run list. If the task is mid-run on the
    /// other core, removal is deferred until that run completes; pair with
    /// [`Scheduler::wait_done`] before tearing down the task's data.
    pub fn deactivate(&self, id: TaskId) {
        critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            if st.slots[id.index()].running != 0 {
                st.slots[id.index()].removed = true;
                return;
            }
            if let Some(pos) = st.position(id.index()) {
                st.unlink_at(pos);
            }
            let slot = &mut st.slots[id.index()];
            slot.active = false;
            slot.pending = false;
            slot.removed = false;
            slot.at = 0;
        });
    }

    /// Spins until no run of the task is in flight and any deferred
    /// deactivation has been honored.
    pub fn wait_done(&self, id: TaskId) {
        loop {
            let busy = critical_section::with(|cs| {
                let st = self.state.borrow_ref(cs);
                st.slots[id.index()].running != 0 || st.slots[id.index()].removed
            });
            if !busy {
                return;
            }
            hint::spin_loop();
        }
    }

    /// Not running and not armed.
    pub fn is_idle(&self, id: TaskId) -> bool {
        critical_section::with(|cs| {
            let st = self.state.borrow_ref(cs);
            st.slots[id.index()].running == 0 && !st.slots[id.index()].pending
        })
    }

    /// Arms the task for immediate dispatch.
    pub fn set_pending(&self, id: TaskId) {
        self.arm(id, 0);
    }

    /// Arms the task for dispatch no earlier than `delay_us` from now.
    pub fn set_pending_delay_us(&self, id: TaskId, delay_us: u64) {
        self.arm(id, (self.clock)() + delay_us);
    }

    /// Arms the task for dispatch no earlier than the absolute time `at`.
    pub fn set_pending_at(&self, id: TaskId, at: u64) {
        self.arm(id, at);
    }

    fn arm(&self, id: TaskId, at: u64) {
        critical_section::with(|cs| {
            let slot = &mut self.state.borrow_ref_mut(cs).slots[id.index()];
            slot.pending = true;
            slot.at = at;
        });
    }

    /// Dispatches at most one ready task whose affinity intersects
    /// `core_mask`, invoking `exec` with its id outside the lock. Returns
    /// the dispatched id, or `None` when nothing was ready.
    pub fn run_one(&self, core_mask: u8, exec: impl FnOnce(TaskId)) -> Option<TaskId> {
        let now = (self.clock)();
        let picked = critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            let mut pick = None;
            for pos in 0..st.len {
                let id = st.order[pos] as usize;
                let slot = &st.slots[id];
                if slot.pending
                    && slot.running == 0
                    && (slot.affinity & core_mask) != 0
                    && (slot.at == 0 || slot.at < now)
                {
                    pick = Some((pos, id));
                    break;
                }
            }
            let (pos, id) = pick?;
            st.unlink_at(pos);
            let slot = &mut st.slots[id];
            slot.running = core_mask;
            slot.pending = false;
            slot.at = 0;
            Some(id)
        })?;

        let id = TaskId(picked as u8);
        log::trace!(target: "sched", "run task {} core {:#04b}", picked, core_mask);
        exec(id);

        critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            let removed = st.slots[picked].removed;
            let slot = &mut st.slots[picked];
            slot.running = 0;
            if removed {
                slot.removed = false;
                slot.active = false;
                slot.pending = false;
                slot.at = 0;
            } else {
                st.push_tail(picked);
            }
        });
        Some(id)
    }
}
