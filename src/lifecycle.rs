// Mount/unmount lifecycle for host-driven animation loops.
// The host owns the requestAnimationFrame loop and keeps scheduling while
// `frame` returns true. Unmounting halts the engine and turns every later
// frame into a no-op, so a page swap cannot leave a loop running.

use tracing::debug;

/// An engine that advances once per animation frame.
pub trait Animated {
    /// Advance one frame. Returns whether the host should schedule another.
    fn frame(&mut self, now_ms: f64) -> bool;

    /// Stop the loop and drop any pending one-shot work.
    fn halt(&mut self);
}

/// A mounted engine instance. Dropping it halts the engine.
#[derive(Debug)]
pub struct Mounted<E: Animated> {
    engine: Option<E>,
}

impl<E: Animated> Mounted<E> {
    pub fn mount(engine: E) -> Self {
        debug!("engine mounted");
        Mounted {
            engine: Some(engine),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.engine.is_some()
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut E> {
        self.engine.as_mut()
    }

    /// Forward a frame. Always false once unmounted.
    pub fn frame(&mut self, now_ms: f64) -> bool {
        self.engine
            .as_mut()
            .map_or(false, |engine| engine.frame(now_ms))
    }

    /// Halt and release the engine. Later calls return `None`.
    pub fn unmount(&mut self) -> Option<E> {
        let mut engine = self.engine.take()?;
        engine.halt();
        debug!("engine unmounted");
        Some(engine)
    }
}

impl<E: Animated> Drop for Mounted<E> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.halt();
        }
    }
}
