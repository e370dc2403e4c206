//! Program loading: raw binaries and two-pass assembly with labels.
//!
//! The loader borrows a word-granular writer into simulated memory; it
//! never owns the memory model. Binary programs are streamed as
//! little-endian 32-bit words to sequential addresses. Assembly programs
//! get two passes: the first collects `label:` definitions and parses
//! word values, the second resolves `@label` references and writes.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::isa::{InstructionClassifier, InstructionKind, RiscvClassifier};
use crate::memory::{MainMemory, MemoryModel};

/// Word-granular access to simulated memory for program loading.
pub trait MemoryWriter {
    fn write_word(&mut self, address: u32, data: u32);
    fn read_word(&self, address: u32) -> u32;
}

impl MemoryWriter for MainMemory {
    fn write_word(&mut self, address: u32, data: u32) {
        MainMemory::write_word(self, address, data);
    }

    fn read_word(&self, address: u32) -> u32 {
        MainMemory::read_word(self, address)
    }
}

/// Loading writes straight to main memory, bypassing the cache and its
/// counters.
impl MemoryWriter for MemoryModel {
    fn write_word(&mut self, address: u32, data: u32) {
        self.main_memory_mut().write_word(address, data);
    }

    fn read_word(&self, address: u32) -> u32 {
        self.main_memory().read_word(address)
    }
}

/// Errors surfaced while loading a program.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read program file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: could not parse word value '{text}'")]
    Parse { line: u32, text: String },

    #[error("line {line}: unknown label @{label}")]
    UnknownLabel { line: u32, label: String },
}

/// A word parsed in pass one, written in pass two.
#[derive(Debug)]
struct PendingWord {
    address: u32,
    value: WordValue,
    line: u32,
}

#[derive(Debug)]
enum WordValue {
    Literal(u32),
    LabelRef(String),
}

/// Streams program words into borrowed memory, tracking the load cursor
/// and the label table across files.
pub struct ProgramLoader<'a, M: MemoryWriter> {
    memory: &'a mut M,
    program_counter: u32,
    labels: HashMap<String, u32>,
}

impl<'a, M: MemoryWriter> ProgramLoader<'a, M> {
    pub fn new(memory: &'a mut M) -> Self {
        ProgramLoader {
            memory,
            program_counter: 0,
            labels: HashMap::new(),
        }
    }

    pub fn program_counter(&self) -> u32 {
        self.program_counter
    }

    /// Move the load cursor. The next load starts here.
    pub fn set_program_counter(&mut self, address: u32) {
        self.program_counter = address;
    }

    /// Stream a binary file as little-endian 32-bit words to sequential
    /// addresses from the load cursor. Returns the start address.
    /// A trailing partial word is ignored.
    pub fn load_binary(&mut self, path: &Path) -> Result<u32, LoadError> {
        let bytes = fs::read(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(self.load_words(bytes.chunks_exact(4).map(|chunk| {
            u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
        })))
    }

    /// Write a sequence of words from the load cursor; returns the start
    /// address.
    pub fn load_words(&mut self, words: impl IntoIterator<Item = u32>) -> u32 {
        let start = self.program_counter;
        for word in words {
            self.memory.write_word(self.program_counter, word);
            self.program_counter += 4;
        }
        start
    }

    /// Two-pass assembly load from a file. Returns the start address.
    pub fn load_assembly(&mut self, path: &Path) -> Result<u32, LoadError> {
        let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.load_assembly_text(&text)
    }

    /// Two-pass assembly load from text.
    ///
    /// Accepted lines, after stripping blanks and `#`/`;` comments:
    /// - `label:` binds `label` to the current address (an instruction
    ///   may follow on the same line)
    /// - `.word <value>` or a bare value emits one 32-bit word; `<value>`
    ///   is hex (`0x...`), decimal, or `@label` (the label's address)
    pub fn load_assembly_text(&mut self, text: &str) -> Result<u32, LoadError> {
        let start = self.program_counter;
        let mut pending = Vec::new();

        // Pass 1: bind labels, parse word values
        for (idx, raw) in text.lines().enumerate() {
            let line_num = idx as u32 + 1;
            let mut line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(pos) = line.find(':') {
                let label = line[..pos].trim();
                if !label.is_empty() {
                    self.labels.insert(label.to_string(), self.program_counter);
                }
                line = line[pos + 1..].trim();
            }
            if line.is_empty() {
                continue;
            }

            let value = parse_word(line, line_num)?;
            pending.push(PendingWord {
                address: self.program_counter,
                value,
                line: line_num,
            });
            self.program_counter += 4;
        }

        // Pass 2: resolve label references, write to memory
        for word in pending {
            let resolved = match word.value {
                WordValue::Literal(value) => value,
                WordValue::LabelRef(label) => {
                    *self
                        .labels
                        .get(&label)
                        .ok_or(LoadError::UnknownLabel {
                            line: word.line,
                            label: label.clone(),
                        })?
                }
            };
            self.memory.write_word(word.address, resolved);
        }

        Ok(start)
    }

    /// Address bound to `label`, if defined.
    pub fn label(&self, name: &str) -> Option<u32> {
        self.labels.get(name).copied()
    }

    /// Print `count` loaded words from `start` with their scheduling class.
    pub fn print_program(&self, start: u32, count: u32) {
        let classifier = RiscvClassifier;
        println!("Program listing:");
        println!("----------------");
        for i in 0..count {
            let address = start + 4 * i;
            let word = self.memory.read_word(address);
            let kind = match classifier.classify(word) {
                InstructionKind::Branch => "branch",
                InstructionKind::Exit => "system",
                InstructionKind::Other => "word",
            };
            println!("0x{:08x}: 0x{:08x}  {}", address, word, kind);
        }
    }
}

fn parse_word(text: &str, line: u32) -> Result<WordValue, LoadError> {
    let body = text
        .strip_prefix(".word")
        .map(str::trim)
        .unwrap_or(text)
        .trim();

    if let Some(label) = body.strip_prefix('@') {
        if label.is_empty() {
            return Err(LoadError::Parse {
                line,
                text: text.to_string(),
            });
        }
        return Ok(WordValue::LabelRef(label.to_string()));
    }

    let parsed = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        body.parse::<u32>()
    };
    parsed
        .map(WordValue::Literal)
        .map_err(|_| LoadError::Parse {
            line,
            text: text.to_string(),
        })
}
