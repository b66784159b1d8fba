// Adapter description and selection
//
// Both backends enumerate their GPUs into `AdapterInfo` and pick one
// with the same rules.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub kind: AdapterKind,
    pub vendor_id: u32,
    pub device_id: u32,
    /// Device-local memory in bytes
    pub dedicated_memory: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PowerPreference {
    #[default]
    HighPerformance,
    LowPower,
}

impl AdapterKind {
    fn score(self, preference: PowerPreference) -> u32 {
        match (preference, self) {
            (PowerPreference::HighPerformance, AdapterKind::Discrete) => 1000,
            (PowerPreference::HighPerformance, AdapterKind::Integrated) => 100,
            (PowerPreference::LowPower, AdapterKind::Integrated) => 1000,
            (PowerPreference::LowPower, AdapterKind::Discrete) => 100,
            (_, AdapterKind::Virtual) => 10,
            (_, AdapterKind::Other) => 5,
            (_, AdapterKind::Cpu) => 1,
        }
    }
}

impl std::fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:?}, {:04x}:{:04x}, {} MiB)",
            self.name,
            self.kind,
            self.vendor_id,
            self.device_id,
            self.dedicated_memory / (1024 * 1024)
        )
    }
}

/// Pick the index of the best adapter.
///
/// A name filter narrows the candidates (case-insensitive substring); if it
/// matches nothing it is ignored with a warning. Remaining adapters are
/// ranked by kind for the power preference, then by dedicated memory.
pub fn select_adapter(
    adapters: &[AdapterInfo],
    preference: PowerPreference,
    name_filter: Option<&str>,
) -> Option<usize> {
    let mut candidates: Vec<usize> = (0..adapters.len()).collect();

    if let Some(filter) = name_filter.filter(|f| !f.is_empty()) {
        let needle = filter.to_lowercase();
        let matching: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| adapters[i].name.to_lowercase().contains(&needle))
            .collect();

        if matching.is_empty() {
            log::warn!("No adapter matches '{}', considering all adapters", filter);
        } else {
            candidates = matching;
        }
    }

    candidates.into_iter().max_by(|&a, &b| {
        let (a, b) = (&adapters[a], &adapters[b]);
        a.kind
            .score(preference)
            .cmp(&b.kind.score(preference))
            .then(a.dedicated_memory.cmp(&b.dedicated_memory))
            // max_by keeps the last maximum; prefer enumeration order on ties
            .then(std::cmp::Ordering::Greater)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(name: &str, kind: AdapterKind, memory_mib: u64) -> AdapterInfo {
        AdapterInfo {
            name: name.to_string(),
            kind,
            vendor_id: 0x10de,
            device_id: 0x2204,
            dedicated_memory: memory_mib * 1024 * 1024,
        }
    }

    fn adapters() -> Vec<AdapterInfo> {
        vec![
            adapter("Intel UHD Graphics 770", AdapterKind::Integrated, 128),
            adapter("NVIDIA GeForce RTX 3090", AdapterKind::Discrete, 24576),
            adapter("Microsoft Basic Render Driver", AdapterKind::Cpu, 0),
            adapter("AMD Radeon RX 6600", AdapterKind::Discrete, 8192),
        ]
    }

    #[test]
    fn high_performance_prefers_biggest_discrete() {
        assert_eq!(select_adapter(&adapters(), PowerPreference::HighPerformance, None), Some(1));
    }

    #[test]
    fn low_power_prefers_integrated() {
        assert_eq!(select_adapter(&adapters(), PowerPreference::LowPower, None), Some(0));
    }

    #[test]
    fn name_filter_wins_over_score() {
        let picked = select_adapter(&adapters(), PowerPreference::HighPerformance, Some("radeon"));
        assert_eq!(picked, Some(3));
    }

    #[test]
    fn unmatched_filter_falls_back_to_all() {
        let picked = select_adapter(&adapters(), PowerPreference::HighPerformance, Some("voodoo"));
        assert_eq!(picked, Some(1));
    }

    #[test]
    fn software_only_as_last_resort() {
        let only_cpu = vec![adapter("llvmpipe", AdapterKind::Cpu, 0)];
        assert_eq!(select_adapter(&only_cpu, PowerPreference::HighPerformance, None), Some(0));
        assert_eq!(select_adapter(&[], PowerPreference::HighPerformance, None), None);
    }

    #[test]
    fn ties_keep_enumeration_order() {
        let twins = vec![
            adapter("GPU A", AdapterKind::Discrete, 8192),
            adapter("GPU B", AdapterKind::Discrete, 8192),
        ];
        assert_eq!(select_adapter(&twins, PowerPreference::HighPerformance, None), Some(0));
    }

    #[test]
    fn display_includes_ids_and_memory() {
        let text = adapter("RTX", AdapterKind::Discrete, 2048).to_string();
        assert_eq!(text, "RTX (Discrete, 10de:2204, 2048 MiB)");
    }
}
