//! In-memory machine checkpoints, serialized with bincode.

use serde::{Deserialize, Serialize};

use crate::cpu::{PendingInterrupts, Registers};
use crate::error::EmuError;
use crate::instrumentation::Instrumentation;
use crate::memory::AddressSpace;
use crate::ppu::BeamTimer;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorState {
    pub registers: Registers,
    pub pending: PendingInterrupts,
    pub space: AddressSpace,
    pub instrumentation: Instrumentation,
}

/// Everything that changes while the machine runs. The profile is not part
/// of it; a snapshot only restores into a machine built from the same one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineState {
    pub version: u32,
    pub main: ProcessorState,
    pub ppu: ProcessorState,
    pub main_running: bool,
    pub tables: Vec<u8>,
    pub beam: BeamTimer,
    pub frames_presented: u64,
    pub ticks: u64,
}

impl MachineState {
    pub fn new(
        main: ProcessorState,
        ppu: ProcessorState,
        main_running: bool,
        tables: Vec<u8>,
        beam: BeamTimer,
        frames_presented: u64,
        ticks: u64,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            main,
            ppu,
            main_running,
            tables,
            beam,
            frames_presented,
            ticks,
        }
    }
}

/// An encoded [`MachineState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    bytes: Vec<u8>,
}

impl Snapshot {
    pub fn encode(state: &MachineState) -> Result<Self, EmuError> {
        let bytes = bincode::serialize(state)?;
        log::debug!("Snapshot taken ({} bytes)", bytes.len());
        Ok(Self { bytes })
    }

    pub fn decode(&self) -> Result<MachineState, EmuError> {
        let state: MachineState = bincode::deserialize(&self.bytes)?;
        if state.version != SNAPSHOT_VERSION {
            return Err(EmuError::Snapshot(format!(
                "version {} is not supported (expected {})",
                state.version, SNAPSHOT_VERSION
            )));
        }
        Ok(state)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}
