//! NES System Bus Implementation.
//!
//! The bus connects the CPU to all other components:
//! - PPU registers ($2000-$2007, mirrored every 8 bytes to $3FFF)
//! - APU/IO registers ($4000-$4017, APU itself is out of scope and reads as open bus)
//! - Cartridge space ($4020-$FFFF)
//! - Internal RAM ($0000-$07FF, mirrored to $1FFF)

use rustynes_cpu::Bus;
use rustynes_mappers::{Mapper, Mirroring as MapperMirroring};
use rustynes_ppu::{Mirroring as PpuMirroring, Ppu};

pub use crate::input::{Button, Controller};

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

/// Translate the mapper's nametable mirroring mode into the PPU's own
/// mirroring type. The two crates define identical enums independently
/// so that neither depends on the other.
fn translate_mirroring(mirroring: MapperMirroring) -> PpuMirroring {
    match mirroring {
        MapperMirroring::Horizontal => PpuMirroring::Horizontal,
        MapperMirroring::Vertical => PpuMirroring::Vertical,
        MapperMirroring::SingleScreenLower => PpuMirroring::SingleScreenLower,
        MapperMirroring::SingleScreenUpper => PpuMirroring::SingleScreenUpper,
        MapperMirroring::FourScreen => PpuMirroring::FourScreen,
    }
}

/// NES system bus connecting all components.
pub struct NesBus {
    /// Internal RAM (2KB, mirrored 4 times).
    pub ram: [u8; 2048],
    /// PPU (Picture Processing Unit). Owns its own nametable/palette RAM;
    /// pattern table (CHR) access is delegated to the mapper via closures.
    pub ppu: Ppu,
    /// Cartridge mapper.
    pub mapper: Box<dyn Mapper>,
    /// Controller 1.
    pub controller1: Controller,
    /// Controller 2.
    pub controller2: Controller,
    /// OAM DMA page, set when $4014 is written.
    oam_dma_page: Option<u8>,
    /// CPU cycle counter, used for OAM DMA parity and external timing queries.
    cpu_cycles: u64,
    /// Last value on the data bus (for open bus behavior).
    last_bus_value: u8,
    /// NMI raised by the PPU, latched until the CPU services it.
    nmi_pending: bool,
    /// IRQ line level requested by an external caller (e.g. a test harness).
    irq_line: bool,
    /// Set when a PPU frame completes; drained by the console between steps.
    frame_complete: bool,
}

impl NesBus {
    /// Create a new NES bus with the given mapper.
    pub fn new(mapper: Box<dyn Mapper>) -> Self {
        let mirroring = translate_mirroring(mapper.mirroring());
        Self {
            ram: [0; 2048],
            ppu: Ppu::new(mirroring),
            mapper,
            controller1: Controller::new(),
            controller2: Controller::new(),
            oam_dma_page: None,
            cpu_cycles: 0,
            last_bus_value: 0,
            nmi_pending: false,
            irq_line: false,
            frame_complete: false,
        }
    }

    /// Reset the bus and all components.
    pub fn reset(&mut self) {
        self.ram.fill(0);
        self.ppu.reset();
        self.mapper.reset();
        self.ppu.set_mirroring(translate_mirroring(self.mapper.mirroring()));
        self.controller1.reset();
        self.controller2.reset();
        self.oam_dma_page = None;
        self.cpu_cycles = 0;
        self.last_bus_value = 0;
        self.nmi_pending = false;
        self.irq_line = false;
        self.frame_complete = false;
    }

    /// Check if OAM DMA is pending.
    #[must_use]
    pub fn oam_dma_pending(&self) -> bool {
        self.oam_dma_page.is_some()
    }

    /// Execute OAM DMA transfer.
    ///
    /// Ticks the PPU/mapper for the full stall (513 or 514 cycles,
    /// depending on whether the transfer started on an odd or even CPU
    /// cycle) so rendering and mapper IRQ timing stay accurate across the
    /// stall, just as they would on hardware. Returns the number of CPU
    /// cycles consumed.
    pub fn execute_oam_dma(&mut self) -> u16 {
        let Some(page) = self.oam_dma_page.take() else {
            return 0;
        };

        let cycles = if self.cpu_cycles % 2 == 1 { 514 } else { 513 };
        let base = u16::from(page) << 8;
        let mut data = [0u8; 256];

        // Real hardware alternates idle/read/write cycles; we only need the
        // source bytes and the PPU/mapper ticks, not the exact idle phasing.
        for i in 0..cycles {
            self.on_cpu_cycle();
            if i % 2 == (cycles % 2) && (i as usize / 2) < 256 {
                let idx = (i as usize) / 2;
                data[idx] = self.cpu_read(base.wrapping_add(idx as u16));
            }
        }
        self.ppu.oam_dma(&data);

        self.cpu_cycles += u64::from(cycles);
        cycles
    }

    /// Internal CPU read without updating bus state (for DMA source reads).
    fn cpu_read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],
            0x8000..=0xFFFF => self.mapper.read_prg(addr),
            _ => self.last_bus_value,
        }
    }

    /// Step the PPU by 3 dots (one CPU cycle's worth) and clock the mapper.
    ///
    /// Called once per CPU cycle via [`Bus::on_cpu_cycle`], so PPU/mapper
    /// state is interleaved with CPU bus traffic at full cycle granularity
    /// rather than advanced in bulk after an instruction completes.
    fn step_ppu(&mut self) {
        self.sync_mirroring();

        for _ in 0..3 {
            let mapper = &self.mapper;
            let (fc, nmi) = self.ppu.step_with_chr(|addr| mapper.read_chr(addr));
            self.frame_complete |= fc;
            if nmi {
                self.nmi_pending = true;
            }
        }

        self.mapper.clock(1);
    }

    /// Take and clear the frame-complete flag raised by the PPU since the
    /// last call.
    pub fn take_frame_complete(&mut self) -> bool {
        core::mem::take(&mut self.frame_complete)
    }

    /// Re-read the mapper's current mirroring mode and push it into the PPU.
    ///
    /// Mappers such as MMC1 can change mirroring at runtime, so this is
    /// cheap-enough to call before every PPU-facing operation.
    fn sync_mirroring(&mut self) {
        self.ppu.set_mirroring(translate_mirroring(self.mapper.mirroring()));
    }

    /// Check if NMI is pending.
    #[must_use]
    pub fn nmi_pending(&self) -> bool {
        self.nmi_pending
    }

    /// Acknowledge NMI.
    pub fn acknowledge_nmi(&mut self) {
        self.nmi_pending = false;
    }

    /// Check if IRQ is pending (mapper IRQ or an externally requested line).
    #[must_use]
    pub fn irq_pending(&self) -> bool {
        self.irq_line || self.mapper.irq_pending()
    }

    /// Set the external IRQ request line level.
    pub fn set_irq_line(&mut self, level: bool) {
        self.irq_line = level;
    }

    /// Acknowledge mapper IRQ.
    pub fn acknowledge_mapper_irq(&mut self) {
        self.mapper.irq_acknowledge();
    }

    /// Get the current CPU cycle count.
    #[must_use]
    pub fn cpu_cycles(&self) -> u64 {
        self.cpu_cycles
    }

    /// Increment CPU cycle count.
    pub fn add_cpu_cycles(&mut self, cycles: u8) {
        self.cpu_cycles += u64::from(cycles);
    }

    /// Peek at memory without side effects.
    ///
    /// Useful for debugging/display purposes where we don't want to trigger
    /// PPU register side effects or mapper state changes.
    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        match addr {
            // Internal RAM (mirrored every 2KB)
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],

            // PPU registers - return last bus value to avoid side effects
            0x2000..=0x3FFF => self.last_bus_value,

            // APU and I/O registers (APU is out of scope; reads as open bus)
            0x4000..=0x401F => self.last_bus_value,

            // Cartridge space
            0x4020..=0xFFFF => self.mapper.read_prg(addr),
        }
    }
}

/// CPU bus implementation.
impl Bus for NesBus {
    fn on_cpu_cycle(&mut self) {
        self.step_ppu();
    }

    fn read(&mut self, addr: u16) -> u8 {
        let value = match addr {
            // Internal RAM (mirrored every 2KB)
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],

            // PPU registers (mirrored every 8 bytes)
            0x2000..=0x3FFF => {
                self.sync_mirroring();
                let mapper = &self.mapper;
                self.ppu.read_register(addr, |a| mapper.read_chr(a))
            }

            // APU and I/O registers
            0x4000..=0x4017 => match addr {
                0x4016 => self.controller1.read(),
                0x4017 => self.controller2.read(),
                // APU is out of scope: registers read as open bus.
                _ => self.last_bus_value,
            },

            // APU test mode (normally disabled)
            0x4018..=0x401F => self.last_bus_value,

            // Cartridge space
            0x4020..=0xFFFF => self.mapper.read_prg(addr),
        };

        self.last_bus_value = value;
        value
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.last_bus_value = val;

        match addr {
            // Internal RAM (mirrored every 2KB)
            0x0000..=0x1FFF => {
                self.ram[(addr & 0x07FF) as usize] = val;
            }

            // PPU registers (mirrored every 8 bytes)
            0x2000..=0x3FFF => {
                self.sync_mirroring();
                let mapper = &mut self.mapper;
                self.ppu.write_register(addr, val, |a, v| mapper.write_chr(a, v));
            }

            // APU and I/O registers
            0x4000..=0x4017 => match addr {
                0x4014 => {
                    // OAM DMA trigger.
                    self.oam_dma_page = Some(val);
                }
                0x4016 => {
                    // $4016 strobes both controllers simultaneously.
                    self.controller1.write_strobe(val);
                    self.controller2.write_strobe(val);
                }
                // $4000-$4013, $4015, $4017: APU is out of scope, writes are no-ops.
                _ => {}
            },

            // APU test mode (normally disabled)
            0x4018..=0x401F => {}

            // Cartridge space
            0x4020..=0xFFFF => {
                self.mapper.write_prg(addr, val);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustynes_mappers::{Mirroring, Nrom, Rom, RomHeader};

    #[cfg(not(feature = "std"))]
    use alloc::{boxed::Box, vec, vec::Vec};

    fn create_test_bus() -> NesBus {
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
            prg_rom: vec![0; 32768],
            chr_rom: vec![0; 8192],
            trainer: None,
        };
        NesBus::new(Box::new(Nrom::new(&rom).unwrap()))
    }

    #[test]
    fn test_ram_mirroring() {
        let mut bus = create_test_bus();

        Bus::write(&mut bus, 0x0000, 0x42);
        assert_eq!(Bus::read(&mut bus, 0x0000), 0x42);

        // Should mirror to $0800, $1000, $1800
        assert_eq!(Bus::read(&mut bus, 0x0800), 0x42);
        assert_eq!(Bus::read(&mut bus, 0x1000), 0x42);
        assert_eq!(Bus::read(&mut bus, 0x1800), 0x42);

        Bus::write(&mut bus, 0x1234, 0xAB);
        assert_eq!(Bus::read(&mut bus, 0x0234), 0xAB); // $1234 & $07FF = $0234
    }

    #[test]
    fn test_controller_strobe() {
        let mut bus = create_test_bus();

        bus.controller1.set_button(Button::A, true);
        bus.controller1.set_button(Button::Select, true);
        bus.controller1.set_button(Button::Up, true);
        bus.controller1.set_button(Button::Right, true);

        // Strobe high then low to latch
        Bus::write(&mut bus, 0x4016, 1);
        Bus::write(&mut bus, 0x4016, 0);

        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 1); // A
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 0); // B
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 1); // Select
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 0); // Start
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 1); // Up
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 0); // Down
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 0); // Left
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 1); // Right
    }

    #[test]
    fn test_oam_dma() {
        let mut bus = create_test_bus();

        for i in 0..256 {
            Bus::write(&mut bus, 0x0200 + i, i as u8);
        }

        Bus::write(&mut bus, 0x4014, 0x02);
        assert!(bus.oam_dma_pending());

        let cycles = bus.execute_oam_dma();
        assert!(!bus.oam_dma_pending());
        assert!(cycles == 513 || cycles == 514);
    }

    #[test]
    fn test_open_bus_behavior() {
        let mut bus = create_test_bus();

        Bus::write(&mut bus, 0x0000, 0xAB);
        let _ = Bus::read(&mut bus, 0x0000);

        assert_eq!(bus.last_bus_value, 0xAB);
    }

    #[test]
    fn test_peek_memory() {
        let mut bus = create_test_bus();

        Bus::write(&mut bus, 0x0100, 0x42);

        assert_eq!(bus.peek(0x0100), 0x42);
        assert_eq!(bus.peek(0x0900), 0x42);
    }

    #[test]
    fn test_reset() {
        let mut bus = create_test_bus();
        bus.nmi_pending = true;

        bus.reset();

        assert_eq!(Bus::read(&mut bus, 0x0000), 0);
        assert_eq!(bus.cpu_cycles, 0);
        assert!(!bus.nmi_pending);
    }

    #[test]
    fn test_irq_line() {
        let mut bus = create_test_bus();
        assert!(!bus.irq_pending());

        bus.set_irq_line(true);
        assert!(bus.irq_pending());

        bus.set_irq_line(false);
        assert!(!bus.irq_pending());
    }
}
