//! Local interrupt masking.

/// The calling CPU as seen by the synchronization primitives.
///
/// Implemented by the platform layer. On the DSP `irq_save` reads and raises
/// the interrupt level of the executing core; host simulations track the
/// masked state per thread.
pub trait CpuContext {
    /// Interrupt state returned by [`irq_save`](Self::irq_save) and handed
    /// back to [`irq_restore`](Self::irq_restore).
    type Flags: Copy;

    /// Index of the executing core.
    fn cpu_id(&self) -> usize;

    /// Masks interrupts on the executing core and returns the previous state.
    fn irq_save(&self) -> Self::Flags;

    /// Restores an interrupt state previously returned by
    /// [`irq_save`](Self::irq_save) on the same core.
    fn irq_restore(&self, flags: Self::Flags);
}

/// RAII guard that masks local interrupts on creation and restores the saved
/// state on drop.
///
/// Guards nest: an inner guard restores the (already masked) state saved by
/// the outer one, so interrupts come back only when the outermost guard is
/// dropped.
///
/// # Examples
///
/// ```
/// use fw_sync::{CpuContext, IrqGuard};
/// use std::cell::Cell;
///
/// struct Cpu(Cell<bool>);
///
/// impl CpuContext for Cpu {
///     type Flags = bool;
///     fn cpu_id(&self) -> usize { 0 }
///     fn irq_save(&self) -> bool { self.0.replace(false) }
///     fn irq_restore(&self, flags: bool) { self.0.set(flags) }
/// }
///
/// let cpu = Cpu(Cell::new(true));
/// {
///     let _g = IrqGuard::new(&cpu);
///     assert!(!cpu.0.get());
/// }
/// assert!(cpu.0.get());
/// ```
#[must_use = "interrupts are restored as soon as the guard is dropped"]
pub struct IrqGuard<'a, C: CpuContext> {
    cpu: &'a C,
    flags: C::Flags,
}

impl<'a, C: CpuContext> IrqGuard<'a, C> {
    /// Masks interrupts on the executing core and remembers the prior state.
    #[inline]
    pub fn new(cpu: &'a C) -> Self {
        let flags = cpu.irq_save();
        Self { cpu, flags }
    }

    /// The CPU whose interrupts this guard masks.
    #[inline]
    pub const fn cpu(&self) -> &'a C {
        self.cpu
    }
}

impl<C: CpuContext> Drop for IrqGuard<'_, C> {
    fn drop(&mut self) {
        self.cpu.irq_restore(self.flags);
    }
}
