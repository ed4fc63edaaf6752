//! ViRGE-class display adapter core.
//!
//! The host side exposes the PCI configuration endpoint, the legacy VGA
//! ports and the memory-mapped register file. Accelerator register writes
//! are queued into a bounded command FIFO and drained by a worker thread
//! that runs the 2D engine and feeds complete triangle setups to a second
//! worker running the [`refrast`] rasterizer over shared video memory.

pub mod fifo;
pub mod irq;
pub mod mmio;
pub mod pci;
pub mod regs;
pub mod rop;
pub mod s3d;
pub mod streams;
pub mod tri;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use log::info;
use refrast::{render_triangle, TriSetup, VramView};

pub use refrast::{ChipGen, Cmd3d, CMD3D_NOP, CMD3D_TRIANGLE};

use fifo::{BoundedQueue, Drained, FifoEntry, FIFO_CAPACITY, TRI_RING_CAPACITY};
use irq::{Irq, IrqSnapshot, INT_3DF_EMP, INT_CMD_DONE, INT_FIFO_EMP, INT_S3D_DONE, INT_VSY};
use pci::PciConfig;
use regs::VgaRegs;
use s3d::{S3d, Win2d};
use streams::Streams;
use tri::apply_tri_reg;

#[derive(Copy, Clone, Debug)]
pub struct VirgeConfig {
    pub gen: ChipGen,
    pub vram_mb: u32,
    pub bar_size_code: u32,
}

impl Default for VirgeConfig {
    fn default() -> Self {
        VirgeConfig {
            gen: ChipGen::VirgeDx,
            vram_mb: 4,
            bar_size_code: 2,
        }
    }
}

struct Shared {
    fifo: BoundedQueue<FifoEntry>,
    ring: BoundedQueue<TriSetup>,
    irq: Irq,
    // 2D engine state. Only the FIFO worker touches it while entries are in
    // flight; the host locks it at idle points for snapshot and reset.
    s3d: Mutex<S3d>,
    tri_count: AtomicU32,
    dma_active: AtomicBool,
}

impl Shared {
    fn s3d(&self) -> MutexGuard<'_, S3d> {
        match self.s3d.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Host-visible device state captured at an idle point.
pub struct VirgeSnapshot {
    vram: Vec<u8>,
    vga: VgaRegs,
    streams: Streams,
    pci: PciConfig,
    irq: IrqSnapshot,
    adv_ctrl: u32,
    dma_base: u32,
    dma_count: u32,
    dma_ctrl: u32,
    serial: u32,
    cmd2d_shadow: [u32; 3],
    cmd3d_shadow: u32,
    s3d: S3d,
    tri_count: u32,
}

pub struct Virge {
    pub(crate) cfg: VirgeConfig,
    vram: Box<[u8]>,
    pub(crate) view: VramView,
    pub(crate) shared: Arc<Shared>,
    pub(crate) vga: VgaRegs,
    pub(crate) streams: Streams,
    pub(crate) pci: PciConfig,
    pub(crate) adv_ctrl: u32,
    pub(crate) dma_base: u32,
    pub(crate) dma_count: u32,
    pub(crate) dma_ctrl: u32,
    pub(crate) serial: u32,
    pub(crate) cmd2d_shadow: [u32; 3],
    pub(crate) cmd3d_shadow: u32,
    fifo_worker: Option<JoinHandle<()>>,
    render_worker: Option<JoinHandle<()>>,
}

impl Virge {
    pub fn new(cfg: VirgeConfig) -> Result<Self, String> {
        if !cfg.vram_mb.is_power_of_two() || !(1..=64).contains(&cfg.vram_mb) {
            return Err(format!("unsupported VRAM size: {} MiB", cfg.vram_mb));
        }
        let mut vram = vec![0u8; (cfg.vram_mb as usize) << 20].into_boxed_slice();
        let view = VramView::new(vram.as_mut_ptr(), vram.len());

        let shared = Arc::new(Shared {
            fifo: BoundedQueue::new(FIFO_CAPACITY),
            ring: BoundedQueue::new(TRI_RING_CAPACITY),
            irq: Irq::new(),
            s3d: Mutex::new(S3d::new()),
            tri_count: AtomicU32::new(0),
            dma_active: AtomicBool::new(false),
        });

        let fifo_worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("virge-fifo".into())
                .spawn(move || fifo_worker_loop(&shared, view))
                .map_err(|e| format!("spawn fifo worker: {e}"))?
        };
        let render_worker = {
            let shared = Arc::clone(&shared);
            let chip = cfg.gen;
            thread::Builder::new()
                .name("virge-render".into())
                .spawn(move || render_worker_loop(&shared, view, chip))
                .map_err(|e| format!("spawn render worker: {e}"))?
        };

        info!(
            "virge: {:?}, {} MiB VRAM, BAR code {}",
            cfg.gen, cfg.vram_mb, cfg.bar_size_code
        );

        Ok(Virge {
            cfg,
            vram,
            view,
            shared,
            vga: VgaRegs::new(),
            streams: Streams::default(),
            pci: PciConfig::new(cfg.gen, cfg.bar_size_code),
            adv_ctrl: 0,
            dma_base: 0,
            dma_count: 0,
            dma_ctrl: 0,
            serial: 0,
            cmd2d_shadow: [0; 3],
            cmd3d_shadow: 0,
            fifo_worker: Some(fifo_worker),
            render_worker: Some(render_worker),
        })
    }

    /// Block until both queues have drained and the engines are parked.
    pub fn wait_idle(&self) {
        self.shared.fifo.wait_idle();
        self.shared.ring.wait_idle();
    }

    pub fn config(&self) -> VirgeConfig {
        self.cfg
    }

    pub fn triangles_drawn(&self) -> u32 {
        self.shared.tri_count.load(Ordering::Relaxed)
    }

    pub fn irq_status(&self) -> u32 {
        self.shared.irq.status()
    }

    /// Enabled interrupt raises since the last call; the host wires this to
    /// its PCI interrupt line.
    pub fn take_pending_irqs(&self) -> u32 {
        self.shared.irq.take_pending()
    }

    /// Start-of-vertical-retrace tick from the host's display timing.
    pub fn vblank_pulse(&self) {
        self.shared.irq.raise(INT_VSY);
    }

    pub fn snapshot(&self) -> VirgeSnapshot {
        self.wait_idle();
        VirgeSnapshot {
            vram: self.vram.to_vec(),
            vga: self.vga.clone(),
            streams: self.streams.clone(),
            pci: self.pci.clone(),
            irq: self.shared.irq.snapshot(),
            adv_ctrl: self.adv_ctrl,
            dma_base: self.dma_base,
            dma_count: self.dma_count,
            dma_ctrl: self.dma_ctrl,
            serial: self.serial,
            cmd2d_shadow: self.cmd2d_shadow,
            cmd3d_shadow: self.cmd3d_shadow,
            s3d: self.shared.s3d().register_image(),
            tri_count: self.shared.tri_count.load(Ordering::Relaxed),
        }
    }

    /// Restore a snapshot taken from a device with the same VRAM size.
    pub fn reset(&mut self, snap: &VirgeSnapshot) -> Result<(), String> {
        self.wait_idle();
        if snap.vram.len() != self.vram.len() {
            return Err(format!(
                "snapshot VRAM is {} bytes, device has {}",
                snap.vram.len(),
                self.vram.len()
            ));
        }
        self.vram.copy_from_slice(&snap.vram);
        self.vga = snap.vga.clone();
        self.streams = snap.streams.clone();
        self.pci = snap.pci.clone();
        self.shared.irq.restore(&snap.irq);
        self.adv_ctrl = snap.adv_ctrl;
        self.dma_base = snap.dma_base;
        self.dma_count = snap.dma_count;
        self.dma_ctrl = snap.dma_ctrl;
        self.serial = snap.serial;
        self.cmd2d_shadow = snap.cmd2d_shadow;
        self.cmd3d_shadow = snap.cmd3d_shadow;
        // Restores the engine's latched registers; a transfer that was still
        // waiting for host data when the snapshot was taken is abandoned.
        *self.shared.s3d() = snap.s3d.register_image();
        self.shared.tri_count.store(snap.tri_count, Ordering::Relaxed);
        self.shared.dma_active.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Compose one scan-out line through the streams processor.
    pub fn scan_out(&self, y: i32, out: &mut [u32]) {
        self.streams.scan_out(&self.view, y, out);
    }

    pub fn close(&mut self) {
        self.shared.fifo.shutdown();
        self.shared.ring.shutdown();
        if let Some(h) = self.fifo_worker.take() {
            let _ = h.join();
        }
        if let Some(h) = self.render_worker.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Virge {
    fn drop(&mut self) {
        self.close();
    }
}

fn fifo_worker_loop(shared: &Shared, view: VramView) {
    let mut pending = TriSetup::default();
    loop {
        match shared.fifo.next() {
            Drained::Item(e) => match e.addr {
                0x0000..=0x7FFF => {
                    shared
                        .s3d()
                        .image_data(&view, &shared.irq, e.value, e.width);
                }
                0xA400..=0xAFFF => {
                    let win = match (e.addr - 0xA400) / 0x400 {
                        0 => Win2d::BitBlt,
                        1 => Win2d::Line,
                        _ => Win2d::Poly,
                    };
                    shared
                        .s3d()
                        .write_reg(win, e.addr & 0x3FF, e.value, &view, &shared.irq);
                }
                0xB400..=0xB7FF => {
                    if apply_tri_reg(&mut pending, e.addr, e.value) {
                        match pending.cmd_word().cmd() {
                            CMD3D_TRIANGLE => {
                                shared.ring.push(pending, 0);
                            }
                            CMD3D_NOP => shared.irq.raise(INT_S3D_DONE),
                            other => panic!("s3d: unimplemented 3D command {:#x}", other),
                        }
                    }
                }
                _ => {}
            },
            Drained::Empty => {
                let mut bits = INT_FIFO_EMP | INT_3DF_EMP;
                if shared.dma_active.load(Ordering::Relaxed) {
                    bits |= INT_CMD_DONE;
                }
                shared.irq.raise(bits);
            }
            Drained::Shutdown => break,
        }
    }
}

fn render_worker_loop(shared: &Shared, view: VramView, chip: ChipGen) {
    loop {
        match shared.ring.next() {
            Drained::Item(tri) => {
                render_triangle(&view, chip, &tri);
                shared.tri_count.fetch_add(1, Ordering::Relaxed);
            }
            Drained::Empty => shared.irq.raise(INT_S3D_DONE),
            Drained::Shutdown => break,
        }
    }
}
