use crate::LockError;
use crate::irq::{CpuContext, IrqGuard};
use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// Holder value while the lock is free or held through [`SpinLock::lock`].
const NO_HOLDER: usize = usize::MAX;

pub struct SpinLock<T> {
    /// lock state
    /// * `false`: unlocked
    /// * `true`: locked
    locked: AtomicBool,
    /// CPU that acquired the lock through [`SpinLock::lock_irq`].
    holder: AtomicUsize,
    inner: UnsafeCell<T>,
}

// Safety: mutual exclusion; only T: Send may cross cores.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(inner: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            holder: AtomicUsize::new(NO_HOLDER),
            inner: UnsafeCell::new(inner),
        }
    }

    /// Try once; returns immediately.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SpinLockGuard { lock: self })
        } else {
            None
        }
    }

    /// Spin until acquired (TATAS), then return a guard.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            // Contended: spin on a plain load until the holder lets go.
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
        SpinLockGuard { lock: self }
    }

    /// Mask interrupts on `cpu`, then spin until acquired.
    ///
    /// The returned guard releases the lock first and restores the saved
    /// interrupt state afterwards.
    ///
    /// # Errors
    /// [`LockError::Reentrant`] if `cpu` already holds this lock. Interrupts
    /// are restored before the error is returned.
    #[inline]
    pub fn lock_irq<'a, C: CpuContext>(
        &'a self,
        cpu: &'a C,
    ) -> Result<IrqSpinLockGuard<'a, T, C>, LockError> {
        let irq = IrqGuard::new(cpu);
        let id = cpu.cpu_id();

        // Only this CPU can have published its own id, and it cannot be
        // preempted while interrupts are masked.
        if self.holder.load(Ordering::Relaxed) == id {
            return Err(LockError::Reentrant { cpu: id });
        }

        let guard = self.lock();
        self.holder.store(id, Ordering::Relaxed);
        Ok(IrqSpinLockGuard { guard, _irq: irq })
    }

    /// Returns the CPU currently holding the lock through
    /// [`lock_irq`](Self::lock_irq), if any.
    #[inline]
    pub fn holder(&self) -> Option<usize> {
        match self.holder.load(Ordering::Relaxed) {
            NO_HOLDER => None,
            id => Some(id),
        }
    }

    /// Closure convenience, built on the guard.
    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut g = self.lock();
        f(&mut g)
    }

    /// Mutable access when you have `&mut self` (no contention possible).
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        // Release publishes the critical section.
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// Guard returned by [`SpinLock::lock_irq`].
///
/// Field order matters: the lock guard drops (and releases) before the
/// interrupt guard restores the saved state.
pub struct IrqSpinLockGuard<'a, T, C: CpuContext> {
    guard: SpinLockGuard<'a, T>,
    _irq: IrqGuard<'a, C>,
}

impl<T, C: CpuContext> Deref for IrqSpinLockGuard<'_, T, C> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, C: CpuContext> DerefMut for IrqSpinLockGuard<'_, T, C> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T, C: CpuContext> Drop for IrqSpinLockGuard<'_, T, C> {
    fn drop(&mut self) {
        self.guard.lock.holder.store(NO_HOLDER, Ordering::Relaxed);
    }
}
