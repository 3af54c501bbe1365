use crate::{CorruptionError, StorageError};
use sparqlite_model::{GraphName, NamedOrBlankNode, Quad, Subject, Term};
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Name of the journal file inside a store directory.
pub const JOURNAL_FILE_NAME: &str = "data.journal";

const DEFAULT_GRAPH_MARKER: &str = "*";

/// A single change recorded in the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    Insert(Quad),
    Remove(Quad),
    CreateGraph(NamedOrBlankNode),
    DropGraph(NamedOrBlankNode),
}

/// Append-only log of committed changes.
///
/// Each commit is written as a group of record lines terminated by a `C` line. Only complete
/// groups are replayed; anything after the last `C` line is a torn write and is discarded when the
/// journal is opened.
///
/// Record lines are tab separated and use the N-Triples serialization of terms:
/// ```text
/// A	<s>	<p>	"o"	*
/// D	<s>	<p>	<o>	<g>
/// G+	<g>
/// G-	<g>
/// C	42
/// ```
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
    sync_on_commit: bool,
    removals: usize,
    /// Length of the journal up to the last commit marker.
    committed_len: u64,
}

impl Journal {
    /// Opens the journal of the store in `directory`, creating it if needed.
    ///
    /// Returns the journal together with the committed groups in commit order.
    pub fn open(
        directory: &Path,
        sync_on_commit: bool,
    ) -> Result<(Self, Vec<Vec<JournalRecord>>), StorageError> {
        let path = directory.join(JOURNAL_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let mut reader = BufReader::new(&file);
        let mut groups = Vec::new();
        let mut pending = Vec::new();
        let mut buffer = Vec::new();
        let mut offset = 0_u64;
        let mut committed_len = 0_u64;
        let mut line_number = 0_usize;
        let mut removals = 0;
        loop {
            buffer.clear();
            let read = reader.read_until(b'\n', &mut buffer)?;
            if read == 0 {
                break;
            }
            offset += read as u64;
            line_number += 1;
            if buffer.last() != Some(&b'\n') {
                // The last line has been cut by a crash
                break;
            }
            if buffer.starts_with(b"C\t") {
                parse_commit_line(line_number, &buffer)?;
                let group = pending
                    .drain(..)
                    .map(|(line_number, line): (usize, Vec<u8>)| {
                        parse_record_line(line_number, &line)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                removals += group
                    .iter()
                    .filter(|r| {
                        matches!(r, JournalRecord::Remove(_) | JournalRecord::DropGraph(_))
                    })
                    .count();
                groups.push(group);
                committed_len = offset;
            } else {
                pending.push((line_number, buffer.clone()));
            }
        }
        drop(reader);

        if offset > committed_len {
            warn!(
                path = %path.display(),
                discarded_bytes = offset - committed_len,
                "Discarding incomplete commit at the end of the journal"
            );
            file.set_len(committed_len)?;
            file.sync_all()?;
        }
        debug!(path = %path.display(), commits = groups.len(), "Replayed journal");

        Ok((
            Self {
                path,
                file,
                sync_on_commit,
                removals,
                committed_len,
            },
            groups,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of removal records in the journal since the last compaction.
    pub fn removals(&self) -> usize {
        self.removals
    }

    /// Appends one commit group. The group is durable once this returns if `sync_on_commit` is set.
    ///
    /// Bytes after the last commit marker, such as the records of a failed append, are truncated
    /// first so that a later commit marker never adopts them.
    pub fn append(
        &mut self,
        version: usize,
        records: &[JournalRecord],
    ) -> Result<(), StorageError> {
        let mut group = String::new();
        for record in records {
            write_record(&mut group, record)?;
        }
        writeln!(group, "C\t{version}")?;

        if self.file.metadata()?.len() != self.committed_len {
            warn!(
                path = %self.path.display(),
                "Discarding uncommitted bytes at the end of the journal"
            );
            self.file.set_len(self.committed_len)?;
        }
        if let Err(error) = self.write_group(&group) {
            warn!(
                path = %self.path.display(),
                %error,
                "Failed to append to the journal, truncating the partial commit"
            );
            self.file.set_len(self.committed_len)?;
            return Err(error);
        }
        self.committed_len += group.len() as u64;
        self.removals += records
            .iter()
            .filter(|r| matches!(r, JournalRecord::Remove(_) | JournalRecord::DropGraph(_)))
            .count();
        Ok(())
    }

    fn write_group(&mut self, group: &str) -> Result<(), StorageError> {
        self.file.write_all(group.as_bytes())?;
        if self.sync_on_commit {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Replaces the journal content with a single group describing the live state.
    ///
    /// The new content is written next to the journal and atomically renamed over it.
    pub fn compact(
        &mut self,
        version: usize,
        live: &[JournalRecord],
    ) -> Result<(), StorageError> {
        let mut temp_path = self.path.clone();
        temp_path.set_extension("journal.tmp");
        {
            let mut temp = File::create(&temp_path)?;
            let mut content = String::new();
            for record in live {
                write_record(&mut content, record)?;
            }
            writeln!(content, "C\t{version}")?;
            temp.write_all(content.as_bytes())?;
            temp.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        self.file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        self.committed_len = self.file.metadata()?.len();
        debug!(
            path = %self.path.display(),
            removed_records = self.removals,
            live_records = live.len(),
            "Compacted journal"
        );
        self.removals = 0;
        Ok(())
    }
}

fn write_record(output: &mut String, record: &JournalRecord) -> std::fmt::Result {
    match record {
        JournalRecord::Insert(quad) => write_quad(output, 'A', quad),
        JournalRecord::Remove(quad) => write_quad(output, 'D', quad),
        JournalRecord::CreateGraph(graph) => writeln!(output, "G+\t{graph}"),
        JournalRecord::DropGraph(graph) => writeln!(output, "G-\t{graph}"),
    }
}

fn write_quad(output: &mut String, tag: char, quad: &Quad) -> std::fmt::Result {
    write!(
        output,
        "{tag}\t{}\t{}\t{}\t",
        quad.subject, quad.predicate, quad.object
    )?;
    match &quad.graph_name {
        GraphName::DefaultGraph => writeln!(output, "{DEFAULT_GRAPH_MARKER}"),
        graph => writeln!(output, "{graph}"),
    }
}

fn parse_commit_line(line_number: usize, line: &[u8]) -> Result<usize, StorageError> {
    let line = decode_line(line_number, line)?;
    line.strip_prefix("C\t")
        .and_then(|version| version.parse().ok())
        .ok_or_else(|| corrupted(line_number, "invalid commit marker"))
}

fn parse_record_line(line_number: usize, line: &[u8]) -> Result<JournalRecord, StorageError> {
    let line = decode_line(line_number, line)?;
    let mut fields = line.split('\t');
    let tag = fields.next().unwrap_or_default();
    let mut next_term = || -> Result<Term, StorageError> {
        let field = fields
            .next()
            .ok_or_else(|| corrupted(line_number, "missing field"))?;
        Term::from_str(field).map_err(|e| corrupted(line_number, e))
    };
    match tag {
        "A" | "D" => {
            let subject = match next_term()? {
                Term::NamedNode(node) => Subject::from(node),
                Term::BlankNode(node) => Subject::from(node),
                _ => return Err(corrupted(line_number, "invalid subject")),
            };
            let predicate = match next_term()? {
                Term::NamedNode(node) => node,
                _ => return Err(corrupted(line_number, "invalid predicate")),
            };
            let object = next_term()?;
            let graph_name = match fields.next() {
                Some(DEFAULT_GRAPH_MARKER) => GraphName::DefaultGraph,
                Some(field) => match parse_graph(line_number, field)? {
                    NamedOrBlankNode::NamedNode(node) => GraphName::NamedNode(node),
                    NamedOrBlankNode::BlankNode(node) => GraphName::BlankNode(node),
                },
                None => return Err(corrupted(line_number, "missing graph name")),
            };
            let quad = Quad::new(subject, predicate, object, graph_name);
            Ok(if tag == "A" {
                JournalRecord::Insert(quad)
            } else {
                JournalRecord::Remove(quad)
            })
        }
        "G+" | "G-" => {
            let field = fields
                .next()
                .ok_or_else(|| corrupted(line_number, "missing graph name"))?;
            let graph = parse_graph(line_number, field)?;
            Ok(if tag == "G+" {
                JournalRecord::CreateGraph(graph)
            } else {
                JournalRecord::DropGraph(graph)
            })
        }
        _ => Err(corrupted(line_number, format!("unknown record tag {tag:?}"))),
    }
}

fn parse_graph(line_number: usize, field: &str) -> Result<NamedOrBlankNode, StorageError> {
    match Term::from_str(field).map_err(|e| corrupted(line_number, e))? {
        Term::NamedNode(node) => Ok(node.into()),
        Term::BlankNode(node) => Ok(node.into()),
        _ => Err(corrupted(line_number, "invalid graph name")),
    }
}

fn decode_line(line_number: usize, line: &[u8]) -> Result<&str, StorageError> {
    let line = std::str::from_utf8(line).map_err(|e| corrupted(line_number, e))?;
    Ok(line.trim_end_matches(['\n', '\r']))
}

fn corrupted(line_number: usize, error: impl ToString) -> StorageError {
    CorruptionError::msg(format!(
        "Invalid journal record at line {line_number}: {}",
        error.to_string()
    ))
    .into()
}
