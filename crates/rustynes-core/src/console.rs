//! NES Console Implementation.
//!
//! The Console struct provides the high-level emulation API, managing the
//! CPU, PPU, and mapper integration with proper timing.

use crate::bus::{Button, Controller, NesBus};
use rustynes_cpu::Cpu;
use rustynes_mappers::{Mapper, Rom, RomError, create_mapper};

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, string::String, vec::Vec};

/// NES emulation timing constants.
pub mod timing {
    /// Master clock frequency (NTSC).
    pub const MASTER_CLOCK_NTSC: u32 = 21_477_272;
    /// CPU clock frequency (NTSC).
    pub const CPU_CLOCK_NTSC: u32 = MASTER_CLOCK_NTSC / 12;
    /// PPU clock frequency (NTSC).
    pub const PPU_CLOCK_NTSC: u32 = MASTER_CLOCK_NTSC / 4;
    /// CPU cycles per frame (NTSC), approximate (actual frames alternate
    /// between 89341 and 89342 PPU dots, i.e. not an exact multiple of 3).
    pub const CPU_CYCLES_PER_FRAME: u32 = 29_780;
    /// PPU dots per scanline.
    pub const PPU_DOTS_PER_SCANLINE: u16 = 341;
    /// Total scanlines (including vblank).
    pub const PPU_SCANLINES: u16 = 262;
    /// Target frame rate (NTSC).
    pub const FRAME_RATE_NTSC: f64 = 60.0988;
}

/// Console error type.
#[derive(Debug, Clone)]
pub enum ConsoleError {
    /// ROM loading error.
    RomError(RomError),
    /// Invalid state.
    InvalidState(String),
}

impl From<RomError> for ConsoleError {
    fn from(err: RomError) -> Self {
        Self::RomError(err)
    }
}

impl core::fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::RomError(e) => write!(f, "ROM error: {e}"),
            Self::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConsoleError {}

/// Which controller port to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    /// Controller 1 ($4016).
    One,
    /// Controller 2 ($4017).
    Two,
}

/// NES console emulator.
pub struct Console {
    /// 6502 CPU.
    cpu: Cpu,
    /// System bus (PPU, mapper, RAM, controllers).
    bus: NesBus,
    /// Frame buffer (256x240 RGBA).
    framebuffer: Vec<u8>,
    /// Total CPU cycles executed.
    total_cycles: u64,
    /// Frame counter.
    frame_count: u64,
    /// Is emulation running?
    running: bool,
}

impl Console {
    /// Create a new console with the given ROM.
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM cannot be loaded or uses an unsupported mapper.
    pub fn new(rom_data: &[u8]) -> Result<Self, ConsoleError> {
        let rom = Rom::load(rom_data)?;
        let mapper = create_mapper(&rom)?;
        Self::with_mapper(mapper)
    }

    /// Create a new console from ROM bytes (alias for `new`).
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM cannot be loaded or uses an unsupported mapper.
    pub fn from_rom_bytes(rom_data: &[u8]) -> Result<Self, ConsoleError> {
        Self::new(rom_data)
    }

    /// Create a console with a pre-created mapper.
    ///
    /// # Errors
    ///
    /// Returns an error if the console cannot be initialized.
    pub fn with_mapper(mapper: Box<dyn Mapper>) -> Result<Self, ConsoleError> {
        let bus = NesBus::new(mapper);
        let cpu = Cpu::new();

        Ok(Self {
            cpu,
            bus,
            framebuffer: vec_zeroed(256 * 240 * 4),
            total_cycles: 0,
            frame_count: 0,
            running: true,
        })
    }

    /// Reset the console to initial state.
    pub fn reset(&mut self) {
        self.cpu.reset(&mut self.bus);
        self.bus.reset();
        self.total_cycles = 0;
        self.running = true;
    }

    /// Power on the console (cold boot).
    pub fn power_on(&mut self) {
        self.reset();
    }

    /// Run emulation for a single step.
    ///
    /// The smallest unit of work the underlying 6502 core exposes is one
    /// full instruction: the interpreter is not a resumable per-cycle state
    /// machine, so stepping "one cycle" really means "the next instruction,
    /// or the remainder of a pending OAM DMA transfer". PPU and mapper state
    /// is still advanced once per CPU cycle consumed, so rendering and
    /// mapper IRQ timing remain cycle-accurate regardless of this
    /// instruction-level granularity.
    ///
    /// Returns the number of CPU cycles executed.
    pub fn step_cycle(&mut self) -> u8 {
        self.step_instruction()
    }

    /// Run emulation for one CPU instruction (or one pending OAM DMA burst).
    ///
    /// Returns the number of CPU cycles executed.
    pub fn step_instruction(&mut self) -> u8 {
        let (cycles, _frame_complete) = self.step_instruction_inner();
        cycles
    }

    /// Internal instruction step, also reporting whether a PPU frame
    /// completed somewhere during the cycles this step consumed.
    fn step_instruction_inner(&mut self) -> (u8, bool) {
        if !self.running {
            return (0, false);
        }

        // Handle OAM DMA first; it blocks the CPU entirely while active.
        // `execute_oam_dma` ticks the PPU/mapper for every stalled cycle
        // via the same `on_cpu_cycle` path the CPU itself uses.
        if self.bus.oam_dma_pending() {
            // `execute_oam_dma` already advances the bus's own cycle
            // counter (used for DMA odd/even parity); only our separate
            // instruction-level counter needs updating here.
            let dma_cycles = self.bus.execute_oam_dma();
            self.total_cycles += u64::from(dma_cycles);
            let frame_complete = self.bus.take_frame_complete();
            return (dma_cycles as u8, frame_complete);
        }

        // Handle interrupts.
        if self.bus.nmi_pending() {
            self.bus.acknowledge_nmi();
            self.cpu.trigger_nmi();
        } else {
            self.cpu.request_irq(self.bus.irq_pending());
        }

        // `Cpu::step` ticks the bus once per CPU clock via `Bus::on_cpu_cycle`,
        // which in turn advances the PPU 3 dots per tick, so rendering stays
        // interleaved with CPU bus traffic at full cycle granularity.
        let cycles = self.cpu.step(&mut self.bus);
        self.bus.add_cpu_cycles(cycles);
        self.total_cycles += u64::from(cycles);
        let frame_complete = self.bus.take_frame_complete();

        (cycles, frame_complete)
    }

    /// Run emulation until the PPU reports a completed frame.
    ///
    /// Returns the actual number of CPU cycles executed.
    pub fn step_frame(&mut self) -> u64 {
        let start_cycles = self.total_cycles;

        loop {
            let (_, frame_complete) = self.step_instruction_inner();
            if frame_complete || !self.running {
                break;
            }
        }

        self.update_framebuffer();
        self.frame_count += 1;

        self.total_cycles - start_cycles
    }

    /// Run emulation for `n` frames.
    ///
    /// Returns the actual number of CPU cycles executed across all frames.
    pub fn run_frames(&mut self, n: u32) -> u64 {
        let start_cycles = self.total_cycles;
        for _ in 0..n {
            if !self.running {
                break;
            }
            self.step_frame();
        }
        self.total_cycles - start_cycles
    }

    /// Update the framebuffer from PPU output.
    fn update_framebuffer(&mut self) {
        let ppu_buffer = self.bus.ppu.frame_buffer();

        for (i, &palette_idx) in ppu_buffer.iter().enumerate() {
            let rgb = crate::palette::NES_PALETTE[palette_idx as usize & 0x3F];
            let offset = i * 4;
            self.framebuffer[offset] = rgb.0; // R
            self.framebuffer[offset + 1] = rgb.1; // G
            self.framebuffer[offset + 2] = rgb.2; // B
            self.framebuffer[offset + 3] = 255; // A
        }
    }

    /// Get the current framebuffer (256x240 RGBA).
    #[must_use]
    pub fn framebuffer(&self) -> &[u8] {
        &self.framebuffer
    }

    /// Get the PPU's background-only palette index buffer, bypassing RGBA
    /// conversion. Primarily useful for tests that want to check rendered
    /// background pixels directly against palette indices.
    #[must_use]
    pub fn background_index_buffer(&self) -> &[u8] {
        self.bus.ppu.background_index_buffer()
    }

    /// Get a controller port.
    #[must_use]
    pub fn controller(&mut self, port: Port) -> &mut Controller {
        match port {
            Port::One => &mut self.bus.controller1,
            Port::Two => &mut self.bus.controller2,
        }
    }

    /// Set a button's state on a controller port.
    pub fn set_button(&mut self, port: Port, button: Button, pressed: bool) {
        match port {
            Port::One => self.bus.controller1.set_button(button, pressed),
            Port::Two => self.bus.controller2.set_button(button, pressed),
        }
    }

    /// Check if NMI is currently pending (not yet serviced by the CPU).
    #[must_use]
    pub fn pending_nmi(&self) -> bool {
        self.bus.nmi_pending()
    }

    /// Set the external IRQ request line level (e.g. for test harnesses that
    /// drive IRQ directly rather than through a mapper).
    pub fn request_irq(&mut self, level: bool) {
        self.bus.set_irq_line(level);
    }

    /// Get the total CPU cycles executed.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Get the frame count.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Check if emulation is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Pause emulation.
    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Resume emulation.
    pub fn resume(&mut self) {
        self.running = true;
    }

    /// Get a reference to the CPU for debugging.
    #[must_use]
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Get a reference to the PPU for debugging.
    #[must_use]
    pub fn ppu(&self) -> &rustynes_ppu::Ppu {
        &self.bus.ppu
    }

    /// Get the total CPU cycles (alias for `total_cycles`).
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Peek at memory without side effects.
    ///
    /// Useful for debugging/display purposes where we don't want to trigger
    /// PPU register side effects or mapper state changes.
    #[must_use]
    pub fn peek_memory(&self, addr: u16) -> u8 {
        self.bus.peek(addr)
    }

    /// Get a reference to the bus for debugging.
    #[must_use]
    pub fn bus(&self) -> &NesBus {
        &self.bus
    }

    /// Get a mutable reference to the bus.
    pub fn bus_mut(&mut self) -> &mut NesBus {
        &mut self.bus
    }

    /// Get the mapper number.
    #[must_use]
    pub fn mapper_number(&self) -> u16 {
        self.bus.mapper.mapper_number()
    }

    /// Get the mapper name.
    #[must_use]
    pub fn mapper_name(&self) -> &'static str {
        self.bus.mapper.mapper_name()
    }

    /// Check if the ROM has battery-backed RAM.
    #[must_use]
    pub fn has_battery(&self) -> bool {
        self.bus.mapper.has_battery()
    }

    /// Get battery-backed RAM for saving.
    #[must_use]
    pub fn battery_ram(&self) -> Option<&[u8]> {
        self.bus.mapper.battery_ram()
    }

    /// Load battery-backed RAM.
    pub fn load_battery_ram(&mut self, data: &[u8]) {
        self.bus.mapper.set_battery_ram(data);
    }
}

#[cfg(not(feature = "std"))]
fn vec_zeroed(len: usize) -> Vec<u8> {
    alloc::vec![0; len]
}

#[cfg(feature = "std")]
fn vec_zeroed(len: usize) -> Vec<u8> {
    vec![0; len]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustynes_mappers::{Mirroring, Nrom, RomHeader};

    #[cfg(not(feature = "std"))]
    use alloc::{boxed::Box, vec, vec::Vec};

    fn create_test_console() -> Console {
        let rom = Rom {
            header: RomHeader {
                prg_rom_size: 32768,
                chr_rom_size: 8192,
                mapper_number: 0,
                submapper: 0,
                mirroring: Mirroring::Vertical,
                has_battery: false,
                has_trainer: false,
                nes2_format: false,
                prg_ram_size: 8192,
                prg_nvram_size: 0,
                chr_ram_size: 0,
                chr_nvram_size: 0,
            },
            // Simple program: NOP loop at $8000
            prg_rom: {
                let mut prg = vec![0xEA; 32768]; // Fill with NOPs
                // Reset vector at $FFFC points to $8000
                prg[0x7FFC] = 0x00;
                prg[0x7FFD] = 0x80;
                prg
            },
            chr_rom: vec![0; 8192],
            trainer: None,
        };
        Console::with_mapper(Box::new(Nrom::new(&rom).unwrap())).unwrap()
    }

    #[test]
    fn test_console_creation() {
        let console = create_test_console();
        assert_eq!(console.mapper_number(), 0);
        assert_eq!(console.mapper_name(), "NROM");
    }

    #[test]
    fn test_console_step() {
        let mut console = create_test_console();
        console.reset();

        let cycles = console.step_instruction();
        assert!(cycles > 0);
        assert!(console.total_cycles() > 0);
    }

    #[test]
    fn test_console_framebuffer() {
        let console = create_test_console();
        let fb = console.framebuffer();
        assert_eq!(fb.len(), 256 * 240 * 4);
    }

    #[test]
    fn test_console_pause_resume() {
        let mut console = create_test_console();
        assert!(console.is_running());

        console.pause();
        assert!(!console.is_running());

        console.resume();
        assert!(console.is_running());
    }

    #[test]
    fn test_controller_buttons() {
        let mut console = create_test_console();

        console.set_button(Port::One, Button::A, true);
        console.set_button(Port::One, Button::Start, true);

        assert!(console.controller(Port::One).get_button(Button::A));
        assert!(console.controller(Port::One).get_button(Button::Start));
        assert!(!console.controller(Port::One).get_button(Button::B));
    }

    #[test]
    fn test_console_reset() {
        let mut console = create_test_console();

        for _ in 0..100 {
            console.step_instruction();
        }

        let cycles_before = console.total_cycles();
        assert!(cycles_before > 0);

        console.reset();
        assert_eq!(console.total_cycles(), 0);
    }

    #[test]
    fn test_step_frame_completes() {
        let mut console = create_test_console();
        console.reset();

        let cycles = console.step_frame();
        assert!(cycles > 0);
        assert_eq!(console.frame_count(), 1);
    }

    #[test]
    fn test_run_frames() {
        let mut console = create_test_console();
        console.reset();

        console.run_frames(3);
        assert_eq!(console.frame_count(), 3);
    }

    #[test]
    fn test_pending_nmi_and_irq_request() {
        let mut console = create_test_console();
        console.reset();

        assert!(!console.pending_nmi());

        console.request_irq(true);
        assert!(console.bus().irq_pending());

        console.request_irq(false);
        assert!(!console.bus().irq_pending());
    }
}
