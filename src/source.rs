//! Where raw acquisition windows come from
//!
//! The real instrument feed lives outside this crate; these sources replay
//! recorded CSV captures or synthesize a plausible signal so the producer has
//! something to send.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;

use crate::{
    channel::ADC_SAMPLES,
    error::{Error, Result},
};

/// Aligned windows from the two producer channels
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkPair {
    pub g: Vec<Vec<f64>>,
    pub h: Vec<Vec<f64>>,
}

pub trait WaveformSource {
    /// Up to `rows` windows per channel, or `None` once either channel has
    /// run dry
    fn next_chunk(&mut self, rows: usize) -> Result<Option<ChunkPair>>;

    /// Start over from the first window
    fn rewind(&mut self) -> Result<()>;
}

/// Two CSV captures, one window per row after a header line
pub struct CsvPairSource {
    paths: [PathBuf; 2],
    readers: [csv::Reader<File>; 2],
}

fn open_csv(path: &Path) -> Result<csv::Reader<File>> {
    Ok(csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?)
}

fn read_rows(reader: &mut csv::Reader<File>, rows: usize) -> Result<Vec<Vec<f64>>> {
    let mut out = Vec::with_capacity(rows);
    let mut record = csv::StringRecord::new();
    while out.len() < rows && reader.read_record(&mut record)? {
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let window = record
            .iter()
            .map(|field| {
                field.parse::<f64>().map_err(|_| Error::Parse {
                    line,
                    value: field.to_owned(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        out.push(window);
    }
    Ok(out)
}

impl CsvPairSource {
    pub fn open(g: impl Into<PathBuf>, h: impl Into<PathBuf>) -> Result<Self> {
        let paths = [g.into(), h.into()];
        let readers = [open_csv(&paths[0])?, open_csv(&paths[1])?];
        Ok(Self { paths, readers })
    }
}

impl WaveformSource for CsvPairSource {
    fn next_chunk(&mut self, rows: usize) -> Result<Option<ChunkPair>> {
        let [g_reader, h_reader] = &mut self.readers;
        let g = read_rows(g_reader, rows)?;
        let h = read_rows(h_reader, rows)?;
        if g.is_empty() || h.is_empty() {
            return Ok(None);
        }
        Ok(Some(ChunkPair { g, h }))
    }

    fn rewind(&mut self) -> Result<()> {
        debug!(g = ?self.paths[0], h = ?self.paths[1], "Reopening CSV captures");
        self.readers = [open_csv(&self.paths[0])?, open_csv(&self.paths[1])?];
        Ok(())
    }
}

/// Noisy baseline with a few Gaussian pulses per channel. Rewinding reseeds,
/// so every pass yields the same windows.
pub struct SyntheticSource {
    seed: u64,
    rng: StdRng,
    windows: usize,
    produced: usize,
    t: f64,
}

impl SyntheticSource {
    pub const BASELINE: f64 = 30000.0;
    pub const NOISE: f64 = 1500.0;

    /// `windows` is how many windows per channel one pass contains
    pub fn new(seed: u64, windows: usize) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
            windows,
            produced: 0,
            t: 0.0,
        }
    }

    fn window(&mut self, pulses: &[(f64, f64, f64)]) -> Vec<f64> {
        // Pulses drift slowly so consecutive packets differ
        let drift = 40.0 * (self.t * 0.05).sin();
        (0..ADC_SAMPLES)
            .map(|i| {
                let signal: f64 = pulses
                    .iter()
                    .map(|&(center, width, amp)| {
                        let d = (i as f64 - center - drift) / width;
                        amp * (-d * d).exp()
                    })
                    .sum();
                Self::BASELINE + signal + self.rng.gen_range(-Self::NOISE..Self::NOISE)
            })
            .collect()
    }
}

impl WaveformSource for SyntheticSource {
    fn next_chunk(&mut self, rows: usize) -> Result<Option<ChunkPair>> {
        let rows = rows.min(self.windows - self.produced);
        if rows == 0 {
            return Ok(None);
        }
        let mut chunk = ChunkPair::default();
        for _ in 0..rows {
            chunk.g.push(self.window(&[(250.0, 12.0, 18000.0), (700.0, 20.0, 24000.0)]));
            chunk.h.push(self.window(&[(400.0, 15.0, 26000.0), (460.0, 8.0, 9000.0)]));
            self.t += 1.0;
        }
        self.produced += rows;
        Ok(Some(chunk))
    }

    fn rewind(&mut self) -> Result<()> {
        *self = Self::new(self.seed, self.windows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, io::Write};

    fn write_csv(name: &str, rows: &[&[f64]]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.csv", name, std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        let width = rows[0].len();
        let header: Vec<String> = (0..width).map(|i| i.to_string()).collect();
        writeln!(file, "{}", header.join(",")).unwrap();
        for row in rows {
            let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(file, "{}", cells.join(", ")).unwrap();
        }
        path
    }

    #[test]
    fn csv_chunks_and_rewind() {
        let g = write_csv("relay-g", &[&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]]);
        let h = write_csv("relay-h", &[&[7.0, 8.0], &[9.0, 10.0]]);
        let mut src = CsvPairSource::open(&g, &h).unwrap();
        let first = src.next_chunk(2).unwrap().unwrap();
        assert_eq!(first.g, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(first.h, vec![vec![7.0, 8.0], vec![9.0, 10.0]]);
        // H has run out, so the pair is exhausted even though G has a row left
        assert!(src.next_chunk(2).unwrap().is_none());
        src.rewind().unwrap();
        assert_eq!(src.next_chunk(2).unwrap().unwrap(), first);
        fs::remove_file(g).unwrap();
        fs::remove_file(h).unwrap();
    }

    #[test]
    fn csv_bad_cell_is_reported() {
        let g = write_csv("relay-bad-g", &[&[1.0, 2.0]]);
        let h = std::env::temp_dir().join(format!("relay-bad-h-{}.csv", std::process::id()));
        fs::write(&h, "a,b\n1.0,oops\n").unwrap();
        let mut src = CsvPairSource::open(&g, &h).unwrap();
        assert!(matches!(
            src.next_chunk(1),
            Err(Error::Parse { line: 2, ref value }) if value == "oops"
        ));
        fs::remove_file(g).unwrap();
        fs::remove_file(h).unwrap();
    }

    #[test]
    fn missing_file_fails_to_open() {
        assert!(CsvPairSource::open("/nonexistent/g.csv", "/nonexistent/h.csv").is_err());
    }

    #[test]
    fn synthetic_replays_identically() {
        let mut src = SyntheticSource::new(42, 5);
        let a = src.next_chunk(4).unwrap().unwrap();
        assert_eq!(a.g.len(), 4);
        assert_eq!(a.g[0].len(), ADC_SAMPLES);
        // Short final chunk, then exhaustion
        assert_eq!(src.next_chunk(4).unwrap().unwrap().h.len(), 1);
        assert!(src.next_chunk(4).unwrap().is_none());
        src.rewind().unwrap();
        assert_eq!(src.next_chunk(4).unwrap().unwrap(), a);
    }
}
