// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2018 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.

//! Groups consecutive instruction records by object id.

use tracing::error;

use crate::types::{Batch, Instruction};

/// Incremental grouper: feed it lines or records as they are read and it
/// hands back a [`Batch`] each time the object id changes.
#[derive(Debug, Default)]
pub struct BatchGrouper {
    current: Vec<Instruction>,
    lines: usize,
    malformed: usize,
}

impl BatchGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one raw line as read from the stream. Lines that are not valid
    /// UTF-8 count as malformed.
    pub fn push_bytes(&mut self, line: &[u8]) -> Option<Batch> {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        match std::str::from_utf8(line) {
            Ok(line) => self.push_line(line),
            Err(e) => {
                self.lines += 1;
                self.malformed += 1;
                error!(line_number = self.lines, error = %e, "Instruction line is not valid UTF-8");
                None
            }
        }
    }

    /// Parse one NDJSON line. Blank lines are ignored; unparseable lines are
    /// logged and skipped.
    pub fn push_line(&mut self, line: &str) -> Option<Batch> {
        self.lines += 1;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            return None;
        }

        match serde_json::from_str::<Instruction>(line) {
            Ok(instruction) => self.push(instruction),
            Err(e) => {
                self.malformed += 1;
                error!(line_number = self.lines, line = %line, error = %e, "Unparseable instruction line");
                None
            }
        }
    }

    pub fn push(&mut self, instruction: Instruction) -> Option<Batch> {
        let boundary = self
            .current
            .last()
            .is_some_and(|prev| prev.object_id != instruction.object_id);

        let completed = if boundary {
            Batch::new(std::mem::take(&mut self.current))
        } else {
            None
        };
        self.current.push(instruction);
        completed
    }

    /// Flush the trailing batch at end of stream.
    pub fn finish(&mut self) -> Option<Batch> {
        Batch::new(std::mem::take(&mut self.current))
    }

    /// Lines skipped because they did not parse.
    pub fn malformed(&self) -> usize {
        self.malformed
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use quickcheck::quickcheck;
    use serde_json::json;

    use super::*;
    use crate::types::Shark;

    fn group(instructions: Vec<Instruction>) -> Vec<Batch> {
        let mut grouper = BatchGrouper::new();
        let mut batches: Vec<Batch> = instructions
            .into_iter()
            .filter_map(|i| grouper.push(i))
            .collect();
        batches.extend(grouper.finish());
        batches
    }

    fn instruction(object_id: &str, key: &str) -> Instruction {
        Instruction {
            object_id: object_id.to_string(),
            key: key.to_string(),
            md5: None,
            creator: None,
            owner: Some("acct".to_string()),
            old_shark: Shark::new("1.stor", "dc1"),
            new_shark: Shark::new("2.stor", "dc1"),
            moray_etag: "E".to_string(),
        }
    }

    fn line(object_id: &str, key: &str) -> String {
        serde_json::to_string(&instruction(object_id, key)).unwrap()
    }

    #[test]
    fn test_groups_contiguous_runs() {
        let batches = group(vec![
            instruction("a", "k1"),
            instruction("a", "k2"),
            instruction("b", "k3"),
            instruction("a", "k4"),
        ]);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].keys(), vec!["k1", "k2"]);
        assert_eq!(batches[1].object_id(), "b");
        assert_eq!(batches[2].keys(), vec!["k4"]);
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        assert!(group(Vec::new()).is_empty());
        assert!(BatchGrouper::new().finish().is_none());
    }

    #[test]
    fn test_lines_skip_blank_and_malformed() {
        let mut grouper = BatchGrouper::new();
        let mut batches = Vec::new();

        for l in [
            line("a", "k1"),
            String::new(),
            "{not json".to_string(),
            format!("{}\r", line("a", "k2")),
            json!({"objectId": "b"}).to_string(),
            line("b", "k3"),
        ] {
            batches.extend(grouper.push_line(&l));
        }
        batches.extend(grouper.finish());

        assert_eq!(grouper.malformed(), 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].keys(), vec!["k1", "k2"]);
        assert_eq!(batches[1].keys(), vec!["k3"]);
    }

    #[test]
    fn test_invalid_utf8_counts_as_malformed() {
        let mut grouper = BatchGrouper::new();
        let mut batches = Vec::new();

        batches.extend(grouper.push_bytes(format!("{}\n", line("a", "k1")).as_bytes()));
        batches.extend(grouper.push_bytes(b"\xff\xfe garbage\n"));
        batches.extend(grouper.push_bytes(line("b", "k2").as_bytes()));
        batches.extend(grouper.finish());

        assert_eq!(grouper.malformed(), 1);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].keys(), vec!["k1"]);
        assert_eq!(batches[1].keys(), vec!["k2"]);
    }

    quickcheck! {
        fn prop_grouping_preserves_records(ids: Vec<u8>) -> bool {
            let input: Vec<Instruction> = ids
                .iter()
                .enumerate()
                .map(|(n, id)| instruction(&(id % 4).to_string(), &n.to_string()))
                .collect();
            let batches = group(input.clone());

            let flattened: Vec<Instruction> = batches
                .iter()
                .flat_map(|b| b.instructions().to_vec())
                .collect();
            let homogeneous = batches
                .iter()
                .all(|b| b.instructions().iter().all(|i| i.object_id == b.object_id()));
            let split_at_changes = batches
                .windows(2)
                .all(|w| w[0].object_id() != w[1].object_id());

            flattened == input && homogeneous && split_at_changes
        }
    }
}
