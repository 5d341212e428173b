//! Partitioning operations (wipefs/parted).

use crate::HalResult;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct WipeFsOptions {
    pub confirmed: bool,
}

impl WipeFsOptions {
    pub fn new(confirmed: bool) -> Self {
        Self { confirmed }
    }
}

#[derive(Debug, Clone)]
pub struct PartedOptions {
    pub confirmed: bool,
}

impl PartedOptions {
    pub fn new(confirmed: bool) -> Self {
        Self { confirmed }
    }
}

/// A single partition table operation executed via `parted -s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartedOp {
    MkLabel {
        label: String,
    },
    MkPart {
        name: String,
        fs_type: String,
        start: String,
        end: String,
    },
    SetFlag {
        part_num: u32,
        flag: String,
        state: String,
    },
}

impl PartedOp {
    /// Arguments following `parted -s <disk>`.
    pub fn args(&self) -> Vec<String> {
        match self {
            PartedOp::MkLabel { label } => vec!["mklabel".to_string(), label.clone()],
            PartedOp::MkPart {
                name,
                fs_type,
                start,
                end,
            } => vec![
                "-a".to_string(),
                "optimal".to_string(),
                "mkpart".to_string(),
                name.clone(),
                fs_type.clone(),
                start.clone(),
                end.clone(),
            ],
            PartedOp::SetFlag {
                part_num,
                flag,
                state,
            } => vec![
                "set".to_string(),
                part_num.to_string(),
                flag.clone(),
                state.clone(),
            ],
        }
    }
}

pub trait PartitionOps {
    fn wipefs_all(&self, disk: &Path, opts: &WipeFsOptions) -> HalResult<()>;

    /// Execute a single `parted` operation on the given disk.
    fn parted(&self, disk: &Path, op: &PartedOp, opts: &PartedOptions) -> HalResult<()>;
}
