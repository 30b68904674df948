//! In-memory render surface

use crate::capture::traits::RenderSurface;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A solid-colour surface that can be resized, repainted and detached
#[derive(Debug)]
pub struct LoopbackSurface {
    size: Mutex<(u32, u32)>,
    color: Mutex<[u8; 4]>,
    attached: AtomicBool,
}

impl LoopbackSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Mutex::new((width, height)),
            color: Mutex::new([0, 0, 0, 255]),
            attached: AtomicBool::new(true),
        }
    }

    /// Paint every pixel with `rgba`
    pub fn fill(&self, rgba: [u8; 4]) {
        *self.color.lock() = rgba;
    }

    pub fn resize(&self, width: u32, height: u32) {
        *self.size.lock() = (width, height);
    }

    pub fn attach(&self) {
        self.attached.store(true, Ordering::SeqCst);
    }

    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }
}

impl RenderSurface for LoopbackSurface {
    fn size(&self) -> (u32, u32) {
        *self.size.lock()
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn read_pixels(&self) -> Option<Vec<u8>> {
        if !self.is_attached() {
            return None;
        }
        let (width, height) = self.size();
        let color = *self.color.lock();
        Some(color.repeat(width as usize * height as usize))
    }
}
