//! Fetch-decode-execute loop, configuration and lifecycle (§4.9, §4.10, §4.14).
//!
//! Grounded on the teacher's `Emulator`/`Configuration` pair (`lib.rs`): a
//! builder assembles the address space and peripherals up front, then a
//! single long-lived struct owns the CPU state and exposes `step`/`run`.
//! The teacher drives its loop from a host-supplied frame callback tied to
//! wall-clock pacing; this engine instead exposes an `Arc<AtomicBool>`
//! cancellation flag so `stop()` can be called from another thread without
//! the caller needing a reference back into the engine (§5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::breakpoints::Breakpoints;
use crate::cycles;
use crate::decoder::decode;
use crate::error::Result;
use crate::events::{EngineEvent, EventObserver};
use crate::executor;
use crate::logging::{Logger, NullLogger};
use crate::memory::{MemoryMap, RegionKind, Region, RESET_VECTOR_ADDR};
use crate::peripheral::Peripheral;
use crate::registers::RegisterFile;
use crate::state::ExecutionState;
use crate::stats::ExecutionStatistics;
use crate::status::Flag;

/// Builder for an `ExecutionEngine`'s address space, initial image and
/// peripherals (§4.14). Consumed by `ExecutionEngine::new`.
pub struct EngineConfig {
    regions: Vec<Region>,
    image: Option<(u16, Vec<u8>)>,
    peripherals: Vec<(u16, u16, Box<dyn Peripheral>)>,
    logger: Box<dyn Logger>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
            image: None,
            peripherals: Vec::new(),
            logger: Box::new(NullLogger),
        }
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.regions.push(region);
        self
    }

    /// Loads `bytes` into the address space starting at `addr` once the
    /// region table has been validated.
    pub fn with_image(mut self, addr: u16, bytes: Vec<u8>) -> Self {
        self.image = Some((addr, bytes));
        self
    }

    pub fn with_peripheral(mut self, start: u16, end: u16, peripheral: Box<dyn Peripheral>) -> Self {
        self.peripherals.push((start, end, peripheral));
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }
}

pub struct ExecutionEngine {
    regs: RegisterFile,
    mem: MemoryMap,
    state: ExecutionState,
    breakpoints: Breakpoints,
    stats: ExecutionStatistics,
    logger: Box<dyn Logger>,
    observers: Vec<Box<dyn EventObserver>>,
    cancel: Arc<AtomicBool>,
}

impl ExecutionEngine {
    /// Validates the region table (no overlaps, a readable reset-vector
    /// region), loads the initial image and peripherals, and returns an
    /// engine parked in `ExecutionState::Reset` with PC loaded from the
    /// reset vector.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let mut mem = MemoryMap::new(config.regions)?;
        if let Some((addr, bytes)) = config.image {
            mem.load_image(addr, &bytes);
        }
        for (start, end, peripheral) in config.peripherals {
            mem.attach_peripheral(start, end, peripheral);
        }
        let mut regs = RegisterFile::new();
        regs.set_pc(mem.read_word_raw(RESET_VECTOR_ADDR));
        Ok(Self {
            regs,
            mem,
            state: ExecutionState::Reset,
            breakpoints: Breakpoints::new(),
            stats: ExecutionStatistics::new(),
            logger: config.logger,
            observers: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    /// Direct register access for hosts that need to seed state outside the
    /// normal fetch/decode/execute path (e.g. a debugger's register-edit UI).
    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    pub fn memory(&self) -> &MemoryMap {
        &self.mem
    }

    pub fn memory_mut(&mut self) -> &mut MemoryMap {
        &mut self.mem
    }

    pub fn stats(&self) -> &ExecutionStatistics {
        &self.stats
    }

    pub fn breakpoints_mut(&mut self) -> &mut Breakpoints {
        &mut self.breakpoints
    }

    pub fn add_observer(&mut self, observer: Box<dyn EventObserver>) {
        self.observers.push(observer);
    }

    /// A handle another thread can use to request `run` stop at the next
    /// instruction boundary, without needing `&mut ExecutionEngine`.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Requests that a running `run()` loop stop at the next instruction
    /// boundary. Safe to call from another thread via `cancellation_flag`.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Clears RAM, reloads PC from the reset vector, and returns the engine
    /// to `ExecutionState::Reset` (§4.10). Legal from every state.
    pub fn reset(&mut self) -> Result<()> {
        let from = self.state;
        self.regs.reset();
        self.mem.clear_ram();
        self.regs.set_pc(self.mem.read_word_raw(RESET_VECTOR_ADDR));
        self.stats.reset();
        self.cancel.store(false, Ordering::SeqCst);
        self.state = ExecutionState::Reset;
        self.notify(EngineEvent::StateChanged { from, to: ExecutionState::Reset });
        Ok(())
    }

    /// Executes exactly one instruction, surfacing it as a `SingleStep`
    /// transition and returning to `Stopped` on success (§4.9).
    pub fn step(&mut self) -> Result<u32> {
        self.transition_to(ExecutionState::SingleStep)?;
        match self.execute_one() {
            Ok(cycles) => {
                self.transition_to(ExecutionState::Stopped)?;
                Ok(cycles)
            }
            Err(err) => {
                if err.transitions_to_error() {
                    self.force_state(ExecutionState::Error);
                }
                Err(err)
            }
        }
    }

    /// Runs until a breakpoint is hit, `CPUOff` is set, `stop()` is called,
    /// `max_instructions` is reached, or an error occurs.
    pub fn run(&mut self, max_instructions: Option<u64>) -> Result<()> {
        self.transition_to(ExecutionState::Running)?;
        self.cancel.store(false, Ordering::SeqCst);
        let mut executed = 0u64;
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                break;
            }
            let pc = self.regs.get_pc();
            if self.breakpoints.has(pc) {
                self.notify(EngineEvent::BreakpointHit { addr: pc });
                break;
            }
            match self.execute_one() {
                Ok(_) => {}
                Err(err) => {
                    if err.transitions_to_error() {
                        self.force_state(ExecutionState::Error);
                    }
                    return Err(err);
                }
            }
            executed += 1;
            if self.regs.status().get(Flag::CpuOff) {
                self.transition_to(ExecutionState::Halted)?;
                return Ok(());
            }
            if max_instructions.is_some_and(|max| executed >= max) {
                break;
            }
        }
        self.transition_to(ExecutionState::Stopped)
    }

    /// Forces a transition to `Halted` without executing further
    /// instructions, e.g. in response to an external shutdown request.
    pub fn halt(&mut self) -> Result<()> {
        self.transition_to(ExecutionState::Halted)
    }

    fn execute_one(&mut self) -> Result<u32> {
        let pc = self.regs.get_pc();
        self.mem.validate_execute(pc)?;
        let word = self.mem.read_word_raw(pc);
        self.regs.increment_pc(2);

        let instruction = decode(word, pc)?;

        let mut ext_words = Vec::with_capacity(instruction.extension_word_count() as usize);
        for _ in 0..instruction.extension_word_count() {
            let addr = self.regs.get_pc();
            self.mem.validate_execute(addr)?;
            ext_words.push(self.mem.read_word_raw(addr));
            self.regs.increment_pc(2);
        }

        executor::execute(&instruction, &mut self.regs, &mut self.mem, &ext_words)?;

        let cycles = cycles::cycles_for(&instruction);
        self.stats.record(cycles, 0.0);
        self.mem.tick_peripherals(cycles);
        self.notify(EngineEvent::InstructionExecuted { addr: pc, word, cycles });
        Ok(cycles)
    }

    fn transition_to(&mut self, to: ExecutionState) -> Result<()> {
        let from = self.state;
        self.state = from.transition(to)?;
        self.notify(EngineEvent::StateChanged { from, to });
        Ok(())
    }

    /// Bypasses the transition table for the one case it cannot express:
    /// an executor error pushing the engine into `Error` from any state.
    fn force_state(&mut self, to: ExecutionState) {
        let from = self.state;
        self.state = to;
        self.logger.log(
            crate::logging::LogLevel::Error,
            "execution fault",
            &[("from", format!("{from:?}")), ("to", format!("{to:?}"))],
        );
        self.notify(EngineEvent::StateChanged { from, to });
    }

    fn notify(&mut self, event: EngineEvent) {
        for observer in &mut self.observers {
            observer.on_event(event);
        }
    }
}

/// Convenience constructor for the canonical MSP430 memory map: interrupt
/// vector table, FRAM/flash program space and RAM, used by tests and by
/// hosts that don't need a custom layout.
pub fn default_region_table(program_start: u16, ram_start: u16, ram_end: u16) -> Vec<Region> {
    use crate::memory::Permissions;
    vec![
        Region::new(0xff80, 0xffff, Permissions::rx(), RegionKind::InterruptVectorTable),
        Region::new(program_start, 0xff7f, Permissions::rwx(), RegionKind::Program),
        Region::new(ram_start, ram_end, Permissions::rwx(), RegionKind::Ram),
    ]
}
