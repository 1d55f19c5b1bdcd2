//! PID-to-program-number associations backing the Program Association Table.

use crate::psi::{PatData, PatEntry};
use std::collections::BTreeMap;

/// Default PID assigned to the first program's PMT.
pub const PMT_START_PID: u16 = 0x1000;
/// Default `program_number` assigned to the first program.
pub const PROGRAM_NUMBER_START: u16 = 1;

/// Maps PMT (or NIT) PIDs to the program numbers they describe. Entries are kept in
/// PID order so the generated PAT is stable across calls that don't change the map.
#[derive(Debug, Clone, Default)]
pub struct ProgramMap {
    entries: BTreeMap<u16, u16>,
}

impl ProgramMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `pid` with `program_number`, replacing any existing association.
    pub fn set(&mut self, pid: u16, program_number: u16) {
        self.entries.insert(pid, program_number);
    }

    /// Removes the association for `pid`, if any.
    pub fn remove(&mut self, pid: u16) {
        self.entries.remove(&pid);
    }

    /// Builds the PAT contents from the current associations. `transport_stream_id` is
    /// filled in by the caller (the muxer passes through its configured value).
    pub fn to_pat_data(&self, transport_stream_id: u16) -> PatData {
        PatData {
            transport_stream_id,
            entries: self
                .entries
                .iter()
                .map(|(&program_map_pid, &program_number)| PatEntry {
                    program_number,
                    program_map_pid,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_program_maps_to_pmt_start_pid() {
        let mut pm = ProgramMap::new();
        pm.set(PMT_START_PID, PROGRAM_NUMBER_START);
        let pat = pm.to_pat_data(0);
        assert_eq!(pat.entries.len(), 1);
        assert_eq!(pat.entries[0].program_number, PROGRAM_NUMBER_START);
        assert_eq!(pat.entries[0].program_map_pid, PMT_START_PID);
    }

    #[test]
    fn entries_are_ordered_by_pid() {
        let mut pm = ProgramMap::new();
        pm.set(0x1100, 2);
        pm.set(0x1000, 1);
        let pat = pm.to_pat_data(0);
        assert_eq!(pat.entries[0].program_map_pid, 0x1000);
        assert_eq!(pat.entries[1].program_map_pid, 0x1100);
    }

    #[test]
    fn remove_drops_the_association() {
        let mut pm = ProgramMap::new();
        pm.set(PMT_START_PID, PROGRAM_NUMBER_START);
        pm.remove(PMT_START_PID);
        assert!(pm.to_pat_data(0).entries.is_empty());
    }
}
