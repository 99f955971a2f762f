//! 6502 CPU core implementation.
//!
//! This module contains the main CPU structure with all registers,
//! the addressing-mode resolver, interrupt handling, and stack operations.
//! Instruction semantics live in [`crate::instructions`]; this module only
//! drives the cycle-by-cycle bus traffic around them.

use crate::addressing::AddressingMode;
use crate::instructions::OPCODE_TABLE as INSTR_TABLE;
use crate::opcodes::OPCODE_TABLE;
use crate::status::Status;
use crate::vectors;

/// Memory bus seen by the CPU.
///
/// Implementors provide the NES's 16-bit address space (RAM, PPU/APU
/// registers, cartridge mapper) and, for cycle-accurate PPU/APU
/// synchronization, a hook that runs once per CPU clock cycle.
pub trait Bus {
    /// Read a byte, with side effects (e.g. PPU register latch clears).
    fn read(&mut self, addr: u16) -> u8;

    /// Write a byte.
    fn write(&mut self, addr: u16, value: u8);

    /// Read a byte without side effects, for tracing/debugging.
    ///
    /// Default implementation just forwards to a throwaway `read`; buses
    /// that expose side-effect-free memory (RAM, ROM) should override this.
    fn peek(&self, addr: u16) -> u8 {
        let _ = addr;
        0
    }

    /// Advance bus-side components (PPU, APU) by one CPU clock.
    ///
    /// Called at the start of every CPU cycle, before the cycle's actual
    /// bus access, so PPU state observed by that access (e.g. `$2002`
    /// vblank) reflects dots that occurred strictly before it. Buses with
    /// no cycle-level components (simple RAM test harnesses) can ignore
    /// this via the default no-op.
    fn on_cpu_cycle(&mut self) {}
}

/// NES 6502 CPU.
///
/// Cycle-accurate implementation of the MOS 6502 as used in the NES. Each
/// instruction executes in two phases: [`Cpu::resolve_addressing`] resolves
/// the operand address (ticking the bus for every cycle the addressing
/// mode itself costs), then the instruction body in
/// [`crate::instructions`] ticks the bus for whatever cycles its own
/// memory traffic costs. Summed together, every opcode lands on exactly
/// the cycle count in [`crate::opcodes::OPCODE_TABLE`].
#[derive(Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cpu {
    /// Accumulator register.
    pub a: u8,
    /// X index register.
    pub x: u8,
    /// Y index register.
    pub y: u8,
    /// Program counter.
    pub pc: u16,
    /// Stack pointer (points into $0100-$01FF).
    pub sp: u8,
    /// Status flags.
    pub status: Status,
    /// Total cycles executed since power-on.
    pub cycles: u64,
    /// Remaining stall cycles (OAM DMA, DMC DMA).
    pub stall: u32,
    /// Set when the CPU has executed a JAM/KIL opcode and halted.
    pub jammed: bool,

    /// NMI line latch (edge-triggered, set by [`Cpu::trigger_nmi`]).
    pub(crate) nmi_pending: bool,
    /// IRQ line level, set by [`Cpu::request_irq`].
    pub(crate) run_irq: bool,
    /// `run_irq` as sampled at the start of the previous instruction, for the
    /// one-instruction delay after CLI/SEI/PLP/RTI change the I flag.
    pub(crate) prev_run_irq: bool,

    /// Address resolved by [`Cpu::resolve_addressing`] for the current opcode.
    pub(crate) operand_addr: u16,
    /// For `Relative` addressing, the raw (unsigned) branch offset byte.
    pub(crate) operand_value: u8,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    /// Create a new CPU in power-on state.
    ///
    /// A, X, Y start at 0; SP at $FD; status at $24 (I and U set); PC at 0
    /// until [`Cpu::reset`] loads it from the RESET vector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            pc: 0,
            sp: 0xFD,
            status: Status::POWER_ON,
            cycles: 0,
            stall: 0,
            jammed: false,
            nmi_pending: false,
            run_irq: false,
            prev_run_irq: false,
            operand_addr: 0,
            operand_value: 0,
        }
    }

    /// Simulate the RESET sequence: SP decremented by 3 (no writes), I flag
    /// set, PC loaded from the RESET vector. Takes 7 cycles.
    pub fn reset(&mut self, bus: &mut dyn Bus) {
        self.sp = self.sp.wrapping_sub(3);
        self.status.set_flag(Status::I, true);
        for _ in 0..5 {
            self.tick(bus);
        }
        let lo = self.read_byte(bus, vectors::RESET);
        let hi = self.read_byte(bus, vectors::RESET + 1);
        self.pc = u16::from_le_bytes([lo, hi]);
        self.nmi_pending = false;
        self.run_irq = false;
        self.prev_run_irq = false;
        self.jammed = false;
    }

    /// Execute exactly one instruction (polling for pending interrupts
    /// first) and return the number of cycles it consumed.
    pub fn step(&mut self, bus: &mut dyn Bus) -> u8 {
        let cycles_before = self.cycles;

        if self.stall > 0 {
            self.stall -= 1;
            self.tick(bus);
            return 1;
        }

        if self.jammed {
            self.tick(bus);
            return 1;
        }

        let current_run_irq_masked = self.run_irq && !self.status.contains(Status::I);

        if self.nmi_pending {
            self.nmi_pending = false;
            self.service_interrupt(bus, vectors::NMI);
            return (self.cycles - cycles_before) as u8;
        }

        if self.prev_run_irq {
            self.prev_run_irq = current_run_irq_masked;
            self.service_interrupt(bus, vectors::IRQ);
            return (self.cycles - cycles_before) as u8;
        }
        self.prev_run_irq = current_run_irq_masked;

        let opcode = self.read_byte(bus, self.pc);
        self.pc = self.pc.wrapping_add(1);

        let info = &OPCODE_TABLE[opcode as usize];
        self.resolve_addressing(bus, info.addr_mode, info.page_cross_penalty);
        INSTR_TABLE[opcode as usize](self, bus);

        (self.cycles - cycles_before) as u8
    }

    /// Execute exactly one CPU clock cycle, advancing the cycle counter and
    /// giving the bus a chance to step cycle-level components (PPU/APU).
    pub fn tick(&mut self, bus: &mut dyn Bus) {
        self.cycles += 1;
        bus.on_cpu_cycle();
    }

    /// Read a byte, consuming one cycle.
    pub(crate) fn read_byte(&mut self, bus: &mut dyn Bus, addr: u16) -> u8 {
        self.tick(bus);
        bus.read(addr)
    }

    /// Write a byte, consuming one cycle.
    pub(crate) fn write_byte(&mut self, bus: &mut dyn Bus, addr: u16, value: u8) {
        self.tick(bus);
        bus.write(addr, value);
    }

    /// Push a byte to the stack, consuming one cycle.
    pub(crate) fn push_byte(&mut self, bus: &mut dyn Bus, value: u8) {
        let addr = 0x0100 | u16::from(self.sp);
        self.write_byte(bus, addr, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    /// Pop a byte from the stack, consuming one cycle.
    pub(crate) fn pop_byte(&mut self, bus: &mut dyn Bus) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        let addr = 0x0100 | u16::from(self.sp);
        self.read_byte(bus, addr)
    }

    /// Push a 16-bit value to the stack, high byte first (two cycles).
    pub(crate) fn push_word(&mut self, bus: &mut dyn Bus, value: u16) {
        self.push_byte(bus, (value >> 8) as u8);
        self.push_byte(bus, (value & 0xFF) as u8);
    }

    /// Pop a 16-bit value from the stack, low byte first (two cycles).
    pub(crate) fn pop_word(&mut self, bus: &mut dyn Bus) -> u16 {
        let lo = self.pop_byte(bus);
        let hi = self.pop_byte(bus);
        u16::from_le_bytes([lo, hi])
    }

    /// Set the Zero and Negative flags based on `value`.
    pub(crate) fn set_zn(&mut self, value: u8) {
        self.status.set_zn(value);
    }

    /// Resolve the operand address (or, for `Relative`, the raw offset
    /// byte) for the current opcode into `operand_addr`/`operand_value`,
    /// consuming exactly the cycles the addressing mode itself costs.
    /// The instruction body (in [`crate::instructions`]) is responsible
    /// for the cycle(s) of its own data access through `operand_addr()`.
    fn resolve_addressing(&mut self, bus: &mut dyn Bus, mode: AddressingMode, page_cross_penalty: bool) {
        match mode {
            AddressingMode::Implied | AddressingMode::Accumulator => {
                self.tick(bus);
            }
            AddressingMode::Immediate => {
                self.operand_addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
            }
            AddressingMode::ZeroPage => {
                let addr = self.read_byte(bus, self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.operand_addr = u16::from(addr);
            }
            AddressingMode::ZeroPageX => {
                let base = self.read_byte(bus, self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.tick(bus);
                self.operand_addr = u16::from(base.wrapping_add(self.x));
            }
            AddressingMode::ZeroPageY => {
                let base = self.read_byte(bus, self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.tick(bus);
                self.operand_addr = u16::from(base.wrapping_add(self.y));
            }
            AddressingMode::Relative => {
                let offset = self.read_byte(bus, self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.operand_value = offset;
            }
            AddressingMode::Absolute => {
                let lo = self.read_byte(bus, self.pc);
                self.pc = self.pc.wrapping_add(1);
                let hi = self.read_byte(bus, self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.operand_addr = u16::from_le_bytes([lo, hi]);
            }
            AddressingMode::AbsoluteX => {
                let lo = self.read_byte(bus, self.pc);
                self.pc = self.pc.wrapping_add(1);
                let hi = self.read_byte(bus, self.pc);
                self.pc = self.pc.wrapping_add(1);
                let base = u16::from_le_bytes([lo, hi]);
                let indexed = base.wrapping_add(u16::from(self.x));
                let crossed = (base & 0xFF00) != (indexed & 0xFF00);
                if !page_cross_penalty || crossed {
                    self.tick(bus);
                }
                self.operand_addr = indexed;
            }
            AddressingMode::AbsoluteY => {
                let lo = self.read_byte(bus, self.pc);
                self.pc = self.pc.wrapping_add(1);
                let hi = self.read_byte(bus, self.pc);
                self.pc = self.pc.wrapping_add(1);
                let base = u16::from_le_bytes([lo, hi]);
                let indexed = base.wrapping_add(u16::from(self.y));
                let crossed = (base & 0xFF00) != (indexed & 0xFF00);
                if !page_cross_penalty || crossed {
                    self.tick(bus);
                }
                self.operand_addr = indexed;
            }
            AddressingMode::Indirect => {
                let lo = self.read_byte(bus, self.pc);
                self.pc = self.pc.wrapping_add(1);
                let hi = self.read_byte(bus, self.pc);
                self.pc = self.pc.wrapping_add(1);
                let ptr = u16::from_le_bytes([lo, hi]);
                let target_lo = self.read_byte(bus, ptr);
                let hi_addr = if (ptr & 0x00FF) == 0x00FF {
                    ptr & 0xFF00
                } else {
                    ptr.wrapping_add(1)
                };
                let target_hi = self.read_byte(bus, hi_addr);
                self.operand_addr = u16::from_le_bytes([target_lo, target_hi]);
            }
            AddressingMode::IndexedIndirectX => {
                let base = self.read_byte(bus, self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.tick(bus);
                let ptr = base.wrapping_add(self.x);
                let lo = self.read_byte(bus, u16::from(ptr));
                let hi = self.read_byte(bus, u16::from(ptr.wrapping_add(1)));
                self.operand_addr = u16::from_le_bytes([lo, hi]);
            }
            AddressingMode::IndirectIndexedY => {
                let ptr = self.read_byte(bus, self.pc);
                self.pc = self.pc.wrapping_add(1);
                let lo = self.read_byte(bus, u16::from(ptr));
                let hi = self.read_byte(bus, u16::from(ptr.wrapping_add(1)));
                let base = u16::from_le_bytes([lo, hi]);
                let indexed = base.wrapping_add(u16::from(self.y));
                let crossed = (base & 0xFF00) != (indexed & 0xFF00);
                if !page_cross_penalty || crossed {
                    self.tick(bus);
                }
                self.operand_addr = indexed;
            }
        }
    }

    /// Service a pending NMI or IRQ: push PC and status (B=0), set I, load
    /// the handler address from `vector`. Takes 7 cycles.
    fn service_interrupt(&mut self, bus: &mut dyn Bus, vector: u16) {
        self.tick(bus);
        self.tick(bus);
        self.push_word(bus, self.pc);
        let status_byte = self.status.to_stack_byte(false);
        self.push_byte(bus, status_byte);
        self.status.set_flag(Status::I, true);
        let lo = self.read_byte(bus, vector);
        let hi = self.read_byte(bus, vector + 1);
        self.pc = u16::from_le_bytes([lo, hi]);
    }

    /// Assert the NMI line (edge-triggered). NMI is serviced at the next
    /// instruction boundary unless BRK just hijacked it.
    pub fn trigger_nmi(&mut self) {
        self.nmi_pending = true;
    }

    /// Check whether an NMI is latched and waiting to be serviced.
    #[must_use]
    pub fn pending_nmi(&self) -> bool {
        self.nmi_pending
    }

    /// Set the IRQ line level. IRQ is level-triggered: it fires on every
    /// instruction boundary while the line is held and the I flag is clear.
    pub fn request_irq(&mut self, level: bool) {
        self.run_irq = level;
    }

    /// Program counter.
    #[must_use]
    pub fn pc(&self) -> u16 {
        self.pc
    }

    /// Stack pointer.
    #[must_use]
    pub fn sp(&self) -> u8 {
        self.sp
    }

    /// Accumulator register.
    #[must_use]
    pub fn a(&self) -> u8 {
        self.a
    }

    /// X index register.
    #[must_use]
    pub fn x(&self) -> u8 {
        self.x
    }

    /// Y index register.
    #[must_use]
    pub fn y(&self) -> u8 {
        self.y
    }

    /// Status flags.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Total cycles executed since power-on.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Address resolved by the current instruction's addressing mode.
    #[must_use]
    pub(crate) fn operand_addr(&self) -> u16 {
        self.operand_addr
    }

    /// Whether the CPU has executed a JAM/KIL opcode and halted.
    #[must_use]
    pub fn is_jammed(&self) -> bool {
        self.jammed
    }
}
