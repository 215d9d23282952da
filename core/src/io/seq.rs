/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Sequence I/O (ambient, supplementing spec §6's "sequence source"
//! interface with a concrete implementation): FASTA and FASTQ readers,
//! transparent gzip decompression by file extension.
//!
//! Grounded in `examples/original_source/include/SeqIO.hh`: record
//! boundaries are `>`/`@` headers; bases are upper-cased and non-ACGT
//! bytes coerced to `A` during indexing (spec §7, "Input malformed").

use crate::error::{Error, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// One input record: its raw (not yet base-normalized) sequence bytes.
/// Headers are not retained — this index only needs sequence content
/// and its 0-based position in the file, matching spec §6's "color i
/// is assigned to sequence i" default and the pseudoalignment output's
/// "0-based read id within the input file".
pub struct Record {
    pub seq: Vec<u8>,
}

/// A source of sequence records, implemented concretely by
/// [`FastaReader`]/[`FastqReader`] here; the pipeline that drives
/// build/pseudoalignment depends only on this trait, matching spec
/// §1's "sequence source" external-collaborator boundary.
pub trait SequenceSource: Send {
    fn next_record(&mut self) -> Result<Option<Record>>;
}

enum RawReader {
    Plain(BufReader<File>),
    Gz(BufReader<MultiGzDecoder<File>>),
}

impl Read for RawReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            RawReader::Plain(r) => r.read(buf),
            RawReader::Gz(r) => r.read(buf),
        }
    }
}

impl BufRead for RawReader {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        match self {
            RawReader::Plain(r) => r.fill_buf(),
            RawReader::Gz(r) => r.fill_buf(),
        }
    }
    fn consume(&mut self, amt: usize) {
        match self {
            RawReader::Plain(r) => r.consume(amt),
            RawReader::Gz(r) => r.consume(amt),
        }
    }
}

fn open(path: &Path) -> Result<RawReader> {
    let file = File::open(path).map_err(Error::Io)?;
    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        Ok(RawReader::Gz(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(RawReader::Plain(BufReader::new(file)))
    }
}

/// True extension-stripped-of-`.gz` format detection, used by both
/// readers and by the CLI to pick which one to instantiate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeqFormat {
    Fasta,
    Fastq,
}

pub fn detect_format(path: &Path) -> Result<SeqFormat> {
    let mut stem = path.to_path_buf();
    if stem.extension().and_then(|e| e.to_str()) == Some("gz") {
        stem = stem.with_extension("");
    }
    match stem.extension().and_then(|e| e.to_str()) {
        Some("fasta") | Some("fa") | Some("fna") => Ok(SeqFormat::Fasta),
        Some("fastq") | Some("fq") => Ok(SeqFormat::Fastq),
        other => Err(Error::malformed(
            Some(path.to_path_buf()),
            format!("unrecognized sequence file extension: {other:?}"),
        )),
    }
}

/// Opens `path` and returns the right reader for its extension,
/// transparently peeling off `.gz`.
pub fn open_reader(path: &Path) -> Result<Box<dyn SequenceSource>> {
    match detect_format(path)? {
        SeqFormat::Fasta => Ok(Box::new(FastaReader::open(path)?)),
        SeqFormat::Fastq => Ok(Box::new(FastqReader::open(path)?)),
    }
}

/// Upper-cases a sequence in place and coerces any non-ACGT byte to
/// `A`, matching the build-time input normalization rule (spec §7).
pub fn normalize_bases(seq: &mut [u8]) {
    for b in seq.iter_mut() {
        *b = crate::kmer::decode_base(crate::kmer::encode_base(*b));
    }
}

pub struct FastaReader {
    reader: RawReader,
    pending_header: Option<Vec<u8>>,
    path: std::path::PathBuf,
}

impl FastaReader {
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = open(path)?;
        let mut first = [0u8; 1];
        let n = reader.read(&mut first).map_err(Error::Io)?;
        if n == 0 {
            return Ok(FastaReader { reader, pending_header: None, path: path.to_path_buf() });
        }
        if first[0] != b'>' {
            return Err(Error::malformed(Some(path.to_path_buf()), "FASTA file does not start with '>'"));
        }
        let mut header = Vec::new();
        reader.read_until(b'\n', &mut header).map_err(Error::Io)?;
        Ok(FastaReader { reader, pending_header: Some(header), path: path.to_path_buf() })
    }
}

impl SequenceSource for FastaReader {
    fn next_record(&mut self) -> Result<Option<Record>> {
        if self.pending_header.is_none() {
            return Ok(None);
        }
        self.pending_header = None;
        let mut seq = Vec::new();
        loop {
            let mut line = Vec::new();
            let n = self.reader.read_until(b'\n', &mut line).map_err(Error::Io)?;
            if n == 0 {
                break;
            }
            if line.first() == Some(&b'>') {
                self.pending_header = Some(line);
                break;
            }
            while line.last() == Some(&b'\n') || line.last() == Some(&b'\r') {
                line.pop();
            }
            seq.extend_from_slice(&line);
        }
        if seq.is_empty() && self.pending_header.is_none() {
            return Err(Error::malformed(Some(self.path.clone()), "empty FASTA record"));
        }
        Ok(Some(Record { seq }))
    }
}

pub struct FastqReader {
    reader: RawReader,
    path: std::path::PathBuf,
    at_eof: bool,
}

impl FastqReader {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = open(path)?;
        Ok(FastqReader { reader, path: path.to_path_buf(), at_eof: false })
    }
}

impl SequenceSource for FastqReader {
    fn next_record(&mut self) -> Result<Option<Record>> {
        if self.at_eof {
            return Ok(None);
        }
        let mut header = Vec::new();
        let n = self.reader.read_until(b'\n', &mut header).map_err(Error::Io)?;
        if n == 0 {
            self.at_eof = true;
            return Ok(None);
        }
        if header.first() != Some(&b'@') {
            return Err(Error::malformed(Some(self.path.clone()), "FASTQ record does not start with '@'"));
        }
        let mut seq = Vec::new();
        self.reader.read_until(b'\n', &mut seq).map_err(Error::Io)?;
        while seq.last() == Some(&b'\n') || seq.last() == Some(&b'\r') {
            seq.pop();
        }
        let mut plus = Vec::new();
        let n = self.reader.read_until(b'\n', &mut plus).map_err(Error::Io)?;
        if n == 0 || plus.first() != Some(&b'+') {
            return Err(Error::malformed(Some(self.path.clone()), "FASTQ record missing '+' separator line"));
        }
        let mut qual = Vec::new();
        self.reader.read_until(b'\n', &mut qual).map_err(Error::Io)?;
        if seq.is_empty() {
            return Err(Error::malformed(Some(self.path.clone()), "empty FASTQ record"));
        }
        Ok(Some(Record { seq }))
    }
}
