//! Cross-stream content overlap

use ahash::AHashSet;
use stash_core::{ContentDigest, RemoteTreeSnapshot};
use std::fmt::Write as _;

/// `unique[row][col]` is the number of bytes in stream `row` whose content
/// doesn't appear anywhere in stream `col`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsTable {
    pub streams: Vec<String>,
    pub unique: Vec<Vec<u64>>,
}

impl StatsTable {
    pub fn compute(streams: Vec<String>, trees: &[RemoteTreeSnapshot]) -> Self {
        let digests: Vec<AHashSet<&ContentDigest>> = trees
            .iter()
            .map(|tree| tree.files().into_iter().map(|(_, f)| &f.content_id).collect())
            .collect();

        let unique: Vec<Vec<u64>> = trees
            .iter()
            .map(|row| {
                let files = row.files();
                digests
                    .iter()
                    .map(|column| {
                        files
                            .iter()
                            .filter(|(_, f)| !column.contains(&f.content_id))
                            .map(|(_, f)| f.length.max(0) as u64)
                            .sum::<u64>()
                    })
                    .collect()
            })
            .collect();

        Self { streams, unique }
    }

    /// Right-aligned text table, sizes in MiB
    pub fn render(&self) -> String {
        let n = self.streams.len();
        let mut cells = vec![vec![String::new(); n + 1]; n + 1];
        for (idx, stream) in self.streams.iter().enumerate() {
            cells[idx + 1][0] = stream.clone();
            cells[0][idx + 1] = stream.clone();
        }
        for (row, sizes) in self.unique.iter().enumerate() {
            for (col, bytes) in sizes.iter().enumerate() {
                cells[row + 1][col + 1] = format!("{:.1} MiB", *bytes as f64 / (1024.0 * 1024.0));
            }
        }

        let widths: Vec<usize> = (0..=n)
            .map(|col| cells.iter().map(|row| row[col].len()).max().unwrap_or(0))
            .collect();

        let mut out = String::new();
        for row in &cells {
            for (col, cell) in row.iter().enumerate() {
                let _ = write!(out, "{:>width$} | ", cell, width = widths[col]);
            }
            out.truncate(out.trim_end().len());
            out.push('\n');
        }
        out
    }
}
