use std::fmt;

use axrt_sys::{ChipType, VnpuMode};

use crate::{Error, Result};

/// How many NPU cores a compiled model was built for.
///
/// The raw value the driver reports is interpreted per chip family: the
/// two-core family numbers half/full, the three-core family single/dual/triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelPartition {
    Half,
    Full,
    Single,
    Dual,
    Triple,
}

impl ModelPartition {
    /// Decodes the raw type for `chip`; `None` when the chip has no such type.
    pub fn from_raw(chip: ChipType, raw: i32) -> Option<Self> {
        let partition = match (chip, raw) {
            (ChipType::Mc20e, 0) => ModelPartition::Half,
            (ChipType::Mc20e, 1) => ModelPartition::Full,
            (ChipType::Mc50, 0) | (ChipType::M57h, 0) => ModelPartition::Single,
            (ChipType::Mc50, 1) => ModelPartition::Dual,
            (ChipType::Mc50, 2) => ModelPartition::Triple,
            _ => return None,
        };
        Some(partition)
    }

    pub fn describe(self) -> &'static str {
        match self {
            ModelPartition::Half => "half core",
            ModelPartition::Full => "full core",
            ModelPartition::Single => "single core",
            ModelPartition::Dual => "dual core",
            ModelPartition::Triple => "triple core",
        }
    }
}

impl fmt::Display for ModelPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelPartition::Half => "HALF",
            ModelPartition::Full => "FULL",
            ModelPartition::Single => "SINGLE",
            ModelPartition::Dual => "DUAL",
            ModelPartition::Triple => "TRIPLE",
        };
        f.write_str(name)
    }
}

/// Whether a model of `partition` may be loaded while the NPU runs in `mode`.
///
/// | chip family  | vnpu mode                | allowed            |
/// |--------------|--------------------------|--------------------|
/// | three-core   | disabled                 | single/dual/triple |
/// | three-core   | enabled                  | single             |
/// | three-core   | big-little / little-big  | single/dual        |
/// | two-core     | disabled                 | full/half          |
/// | two-core     | enabled                  | half               |
/// | single-core  | any                      | single             |
pub fn is_allowed(chip: ChipType, mode: VnpuMode, partition: ModelPartition) -> bool {
    use ModelPartition::*;
    use VnpuMode::*;

    match chip {
        ChipType::Mc50 => match mode {
            Disabled => matches!(partition, Single | Dual | Triple),
            Enabled => partition == Single,
            BigLittle | LittleBig => matches!(partition, Single | Dual),
        },
        ChipType::Mc20e => match mode {
            Disabled => matches!(partition, Full | Half),
            Enabled => partition == Half,
            BigLittle | LittleBig => false,
        },
        ChipType::M57h => partition == Single,
    }
}

pub fn check_compatibility(chip: ChipType, mode: VnpuMode, partition: ModelPartition) -> Result<()> {
    if is_allowed(chip, mode, partition) {
        Ok(())
    } else {
        Err(Error::Compatibility {
            chip,
            mode,
            partition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODES: [VnpuMode; 4] = [
        VnpuMode::Disabled,
        VnpuMode::Enabled,
        VnpuMode::BigLittle,
        VnpuMode::LittleBig,
    ];
    const PARTITIONS: [ModelPartition; 5] = [
        ModelPartition::Half,
        ModelPartition::Full,
        ModelPartition::Single,
        ModelPartition::Dual,
        ModelPartition::Triple,
    ];

    fn allowed(chip: ChipType, mode: VnpuMode) -> Vec<ModelPartition> {
        PARTITIONS
            .into_iter()
            .filter(|p| is_allowed(chip, mode, *p))
            .collect()
    }

    #[test]
    fn three_core_table() {
        use ModelPartition::*;
        assert_eq!(allowed(ChipType::Mc50, VnpuMode::Disabled), vec![Single, Dual, Triple]);
        assert_eq!(allowed(ChipType::Mc50, VnpuMode::Enabled), vec![Single]);
        assert_eq!(allowed(ChipType::Mc50, VnpuMode::BigLittle), vec![Single, Dual]);
        assert_eq!(allowed(ChipType::Mc50, VnpuMode::LittleBig), vec![Single, Dual]);
    }

    #[test]
    fn two_core_table() {
        use ModelPartition::*;
        assert_eq!(allowed(ChipType::Mc20e, VnpuMode::Disabled), vec![Half, Full]);
        assert_eq!(allowed(ChipType::Mc20e, VnpuMode::Enabled), vec![Half]);
        assert!(allowed(ChipType::Mc20e, VnpuMode::BigLittle).is_empty());
        assert!(allowed(ChipType::Mc20e, VnpuMode::LittleBig).is_empty());
    }

    #[test]
    fn single_core_accepts_its_only_type_in_every_mode() {
        for mode in MODES {
            assert_eq!(allowed(ChipType::M57h, mode), vec![ModelPartition::Single]);
        }
    }

    #[test]
    fn rejection_names_type_and_mode() {
        let err = check_compatibility(ChipType::Mc50, VnpuMode::BigLittle, ModelPartition::Triple)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("TRIPLE"), "{msg}");
        assert!(msg.contains("BIG_LITTLE"), "{msg}");

        let err = check_compatibility(ChipType::Mc20e, VnpuMode::Enabled, ModelPartition::Full)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Compatibility {
                partition: ModelPartition::Full,
                mode: VnpuMode::Enabled,
                ..
            }
        ));
    }

    #[test]
    fn raw_partition_is_read_per_chip() {
        assert_eq!(ModelPartition::from_raw(ChipType::Mc20e, 0).unwrap(), ModelPartition::Half);
        assert_eq!(ModelPartition::from_raw(ChipType::Mc20e, 1).unwrap(), ModelPartition::Full);
        assert_eq!(ModelPartition::from_raw(ChipType::Mc50, 0).unwrap(), ModelPartition::Single);
        assert_eq!(ModelPartition::from_raw(ChipType::Mc50, 2).unwrap(), ModelPartition::Triple);
        assert_eq!(ModelPartition::from_raw(ChipType::M57h, 0).unwrap(), ModelPartition::Single);
        assert!(ModelPartition::from_raw(ChipType::Mc20e, 2).is_none());
        assert!(ModelPartition::from_raw(ChipType::M57h, 1).is_none());
    }
}
