//! Plain-text output of generated networks.
//!
//! Every writer emits one record per line to any [`std::io::Write`]. Sample files start with
//! a one-word header; the trace starts with a comma-separated column header.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::annealing::TraceRecord;
use crate::core::network::FiberNetwork;
use crate::core::pipeline::GeneratedNetwork;

/// Errors raised by [`write_network_files`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OutputError {
    /// Creating or writing a file failed.
    #[error("Failed to write {}", path.display())]
    Write {
        /// File being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Writes one `a b` line per live edge.
///
/// # Errors
///
/// Propagates I/O errors from `out`.
///
/// # Examples
///
/// ```
/// use fibernet::core::io::write_edges;
/// use fibernet::core::network::FiberNetwork;
///
/// let network = FiberNetwork::from_parts(vec![[0.0; 3], [1.0, 0.0, 0.0]], [[0, 1]]).unwrap();
/// let mut out = Vec::new();
/// write_edges(&network, &mut out).unwrap();
/// assert_eq!(String::from_utf8(out).unwrap(), "0 1\n");
/// ```
pub fn write_edges<W: Write>(network: &FiberNetwork, out: &mut W) -> io::Result<()> {
    for edge in network.edges().iter().filter(|e| !e.is_removed()) {
        let [a, b] = edge.endpoints();
        writeln!(out, "{a} {b}")?;
    }
    Ok(())
}

/// Writes one `x y z` line per node.
///
/// # Errors
///
/// Propagates I/O errors from `out`.
pub fn write_nodes<W: Write>(network: &FiberNetwork, out: &mut W) -> io::Result<()> {
    for [x, y, z] in network.nodes() {
        writeln!(out, "{x} {y} {z}")?;
    }
    Ok(())
}

/// Writes `header` followed by one value per line.
///
/// # Errors
///
/// Propagates I/O errors from `out`.
pub fn write_samples<W: Write>(header: &str, samples: &[f64], out: &mut W) -> io::Result<()> {
    writeln!(out, "{header}")?;
    for value in samples {
        writeln!(out, "{value}")?;
    }
    Ok(())
}

/// Writes the annealing trace with a column header.
///
/// # Errors
///
/// Propagates I/O errors from `out`.
pub fn write_trace<W: Write>(trace: &[TraceRecord], out: &mut W) -> io::Result<()> {
    writeln!(out, "iteration, temperature, length, cosine, total")?;
    for record in trace {
        writeln!(
            out,
            "{}, {}, {}, {}, {}",
            record.iteration,
            record.temperature,
            record.length_energy,
            record.cosine_energy,
            record.total_energy
        )?;
    }
    Ok(())
}

fn write_file(
    path: PathBuf,
    write: impl FnOnce(&mut BufWriter<File>) -> io::Result<()>,
) -> Result<PathBuf, OutputError> {
    let result = File::create(&path).and_then(|file| {
        let mut out = BufWriter::new(file);
        write(&mut out)?;
        out.flush()
    });
    match result {
        Ok(()) => Ok(path),
        Err(source) => Err(OutputError::Write { path, source }),
    }
}

/// Writes the network and, if annealing ran, its distributions and trace into `dir`.
///
/// Files are named `{stem}_edges.txt`, `{stem}_nodes.txt`, and for annealed networks
/// `{stem}_fil_lengths_initial.txt`, `{stem}_fil_lengths.txt`,
/// `{stem}_cosine_histo_initial.txt`, `{stem}_cosine_histo.txt` and
/// `{stem}_obj_function.txt`. Returns the paths written.
///
/// # Errors
///
/// Returns [`OutputError::Write`] naming the first file that could not be written.
pub fn write_network_files(
    dir: &Path,
    stem: &str,
    generated: &GeneratedNetwork,
) -> Result<Vec<PathBuf>, OutputError> {
    let network = &generated.network;
    let path = |suffix: &str| dir.join(format!("{stem}_{suffix}.txt"));

    let mut written = vec![
        write_file(path("edges"), |out| write_edges(network, out))?,
        write_file(path("nodes"), |out| write_nodes(network, out))?,
    ];

    if let Some(report) = &generated.annealing {
        let samples = [
            ("fil_lengths_initial", "fil_lengths", &report.initial.normalized_lengths),
            ("fil_lengths", "fil_lengths", &report.last.normalized_lengths),
            ("cosine_histo_initial", "cosine", &report.initial.cosine_samples),
            ("cosine_histo", "cosine", &report.last.cosine_samples),
        ];
        for (suffix, header, values) in samples {
            written.push(write_file(path(suffix), |out| {
                write_samples(header, values, out)
            })?);
        }
        written.push(write_file(path("obj_function"), |out| {
            write_trace(&report.trace, out)
        })?);
    }

    tracing::debug!(files = written.len(), dir = %dir.display(), "network files written");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::annealing::{AnnealingReport, DistributionSnapshot};
    use crate::core::pipeline::{GeneratorConfigBuilder, NetworkGenerator};

    #[test]
    fn test_nodes_and_samples_format() {
        let network =
            FiberNetwork::from_parts(vec![[0.5, -1.0, 2.0], [1.0, 0.0, 0.0]], [[1, 0]]).unwrap();
        let mut out = Vec::new();
        write_nodes(&network, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0.5 -1 2\n1 0 0\n");

        let mut out = Vec::new();
        write_samples("cosine", &[-0.999, 0.25], &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "cosine\n-0.999\n0.25\n");
    }

    #[test]
    fn test_removed_edges_are_skipped() {
        let mut network = FiberNetwork::from_parts(
            vec![[0.0; 3], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
            [[0, 1], [1, 2]],
        )
        .unwrap();
        network.mark_edge_removed(0);
        let mut out = Vec::new();
        write_edges(&network, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1 2\n");
    }

    #[test]
    fn test_trace_has_header() {
        let trace = [TraceRecord {
            iteration: 0,
            temperature: 0.05,
            length_energy: 1.5,
            cosine_energy: 0.5,
            total_energy: 2.0,
        }];
        let mut out = Vec::new();
        write_trace(&trace, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines, ["iteration, temperature, length, cosine, total", "0, 0.05, 1.5, 0.5, 2"]);
    }

    #[test]
    fn test_write_network_files_into_directory() {
        let config = GeneratorConfigBuilder::default()
            .seed_count(10)
            .adapt_valency(false)
            .anneal(false)
            .build()
            .unwrap();
        let mut generated = NetworkGenerator::new(config).generate().unwrap();
        let dir = std::env::temp_dir().join(format!("fibernet-io-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let written = write_network_files(&dir, "plain", &generated).unwrap();
        assert_eq!(written.len(), 2);
        let edges = std::fs::read_to_string(dir.join("plain_edges.txt")).unwrap();
        assert_eq!(edges.lines().count(), generated.network.live_edge_count());

        generated.annealing = Some(AnnealingReport {
            initial: DistributionSnapshot {
                normalized_lengths: vec![1.0, 2.0],
                ..DistributionSnapshot::default()
            },
            ..AnnealingReport::default()
        });
        let written = write_network_files(&dir, "annealed", &generated).unwrap();
        assert_eq!(written.len(), 7);
        let lengths = std::fs::read_to_string(dir.join("annealed_fil_lengths_initial.txt")).unwrap();
        assert_eq!(lengths, "fil_lengths\n1\n2\n");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_directory_reports_path() {
        let config = GeneratorConfigBuilder::default()
            .seed_count(5)
            .adapt_valency(false)
            .anneal(false)
            .build()
            .unwrap();
        let generated = NetworkGenerator::new(config).generate().unwrap();
        let dir = Path::new("/nonexistent/fibernet/output");
        let err = write_network_files(dir, "x", &generated).unwrap_err();
        assert!(err.to_string().contains("x_edges.txt"));
    }
}
