use crate::error::TranslationError;
use crate::tunnel::TunnelKey;
use bimap::BiHashMap;
use std::io::BufRead;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Pairs each local tunnel key with its key in the routed domain.
///
/// Read-mostly: filled at startup, then consulted for every rewritten frame, possibly from
/// several transports at once.
#[derive(Debug)]
pub struct TranslationTable {
    table: RwLock<BiHashMap<TunnelKey, TunnelKey>>,
}

impl TranslationTable {
    /// Creates a new empty table
    pub fn new() -> Self {
        TranslationTable {
            table: RwLock::new(BiHashMap::new()),
        }
    }

    /// Adds a pair. Fails if either side is already mapped.
    pub fn insert(&self, local: TunnelKey, routed: TunnelKey) -> Result<(), TranslationError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table
            .insert_no_overwrite(local, routed)
            .map_err(|(local, routed)| TranslationError::Exists(format!("{} <-> {}", local, routed)))
    }

    /// Adds a pair, dropping any existing pair that shares either side.
    pub fn insert_overwrite(&self, local: TunnelKey, routed: TunnelKey) {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table.insert(local, routed);
    }

    pub fn routed_for(&self, local: &TunnelKey) -> Option<TunnelKey> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.get_by_left(local).copied()
    }

    pub fn local_for(&self, routed: &TunnelKey) -> Option<TunnelKey> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.get_by_right(routed).copied()
    }

    pub fn contains_local(&self, local: &TunnelKey) -> bool {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.contains_left(local)
    }

    pub fn contains_routed(&self, routed: &TunnelKey) -> bool {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.contains_right(routed)
    }

    pub fn len(&self) -> usize {
        self.table.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads `local routed` pairs, one per line, in [`TunnelKey`] text form. Blank lines and
    /// lines starting with `#` are skipped. Returns the number of pairs added.
    pub fn load<R: BufRead>(&self, reader: R) -> Result<usize, TranslationError> {
        let mut added = 0;
        for (index, line) in reader.lines().enumerate() {
            let line_no = index + 1;
            let line = line.map_err(|e| TranslationError::Parse {
                line: line_no,
                reason: e.to_string(),
            })?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (local, routed) = match (fields.next(), fields.next(), fields.next()) {
                (Some(local), Some(routed), None) => (local, routed),
                _ => {
                    return Err(TranslationError::Parse {
                        line: line_no,
                        reason: "expected two tunnel keys".to_string(),
                    })
                }
            };
            let parse = |field: &str| {
                field.parse::<TunnelKey>().map_err(|reason| TranslationError::Parse {
                    line: line_no,
                    reason: format!("{}: {}", field, reason),
                })
            };
            self.insert(parse(local)?, parse(routed)?)?;
            added += 1;
        }
        debug!(pairs = added, "translation table loaded");
        Ok(added)
    }
}

impl Default for TranslationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_packets::VlanTag;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::thread;

    fn key(s: &str) -> TunnelKey {
        s.parse().unwrap()
    }

    #[test]
    fn lookup_both_ways() {
        let table = TranslationTable::new();
        table.insert(key("1/10"), key("2/100,200")).unwrap();
        assert_eq!(table.routed_for(&key("1/10")), Some(key("2/100,200")));
        assert_eq!(table.local_for(&key("2/100,200")), Some(key("1/10")));
        assert_eq!(table.routed_for(&key("1/11")), None);
        assert!(table.contains_local(&key("1/10")));
        assert!(table.contains_routed(&key("2/100,200")));
        assert!(!table.contains_routed(&key("1/10")));
    }

    #[test]
    fn insert_rejects_duplicates() {
        let table = TranslationTable::new();
        table.insert(key("1/10"), key("2/20")).unwrap();
        assert!(matches!(
            table.insert(key("1/10"), key("2/21")),
            Err(TranslationError::Exists(_))
        ));
        assert!(table.insert(key("1/11"), key("2/20")).is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn insert_overwrite_replaces() {
        let table = TranslationTable::new();
        table.insert(key("1/10"), key("2/20")).unwrap();
        table.insert_overwrite(key("1/10"), key("2/21"));
        assert_eq!(table.routed_for(&key("1/10")), Some(key("2/21")));
        assert_eq!(table.local_for(&key("2/20")), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn load_text() {
        let text = "# local routed\n\n1/10   2/100,200\n1/11 2/101\n";
        let table = TranslationTable::new();
        assert_eq!(table.load(Cursor::new(text)).unwrap(), 2);
        assert_eq!(table.local_for(&key("2/101")), Some(key("1/11")));
    }

    #[test]
    fn load_reports_line() {
        let table = TranslationTable::new();
        let err = table.load(Cursor::new("1/10 2/20\n1/x 2/21\n")).unwrap_err();
        assert!(matches!(err, TranslationError::Parse { line: 2, .. }));

        let err = table.load(Cursor::new("1/12\n")).unwrap_err();
        assert!(matches!(err, TranslationError::Parse { line: 1, .. }));
    }

    #[test]
    fn shared_readers() {
        let local = |vid: u16| TunnelKey::from_tags(1, &[VlanTag::new(vid)]);
        let routed = |vid: u16| TunnelKey::from_tags(2, &[VlanTag::new(vid + 100)]);

        let table = Arc::new(TranslationTable::new());
        for vid in 1..=50 {
            table.insert(local(vid), routed(vid)).unwrap();
        }
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    (1..=50)
                        .filter(|&vid| table.routed_for(&local(vid)) == Some(routed(vid)))
                        .count()
                })
            })
            .collect();
        for reader in readers {
            assert_eq!(reader.join().unwrap(), 50);
        }
    }
}
