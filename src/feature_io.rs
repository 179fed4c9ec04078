//! Tab-separated run input and alignment table output
//!
//! Run files hold one feature per line: `id mass rt intensity [groups]`,
//! where `groups` is a comma-separated list of integers. Blank lines,
//! `#` comments and a header line starting with `id` are skipped.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::feature::{AlignmentFile, Feature};
use crate::row::AlignmentList;

pub fn parse_feature_line(file: usize, line: &str) -> Result<Feature> {
    let fields: Vec<&str> = line.trim().split('\t').collect();
    if fields.len() < 4 {
        bail!(
            "feature line has {} fields, expected at least 4 (id, mass, rt, intensity)",
            fields.len()
        );
    }

    let id: u32 = fields[0]
        .trim()
        .parse()
        .with_context(|| format!("Invalid feature id '{}'", fields[0]))?;
    let mass: f64 = fields[1]
        .trim()
        .parse()
        .with_context(|| format!("Invalid mass '{}'", fields[1]))?;
    let rt: f64 = fields[2]
        .trim()
        .parse()
        .with_context(|| format!("Invalid retention time '{}'", fields[2]))?;
    let intensity: f64 = fields[3]
        .trim()
        .parse()
        .with_context(|| format!("Invalid intensity '{}'", fields[3]))?;
    if !(mass.is_finite() && mass > 0.0) {
        bail!("mass must be positive, got {mass}");
    }

    let mut feature = Feature::new(file, id, mass, rt, intensity);
    if let Some(groups) = fields.get(4).map(|g| g.trim()).filter(|g| !g.is_empty()) {
        let groups = groups
            .split(',')
            .map(|g| {
                g.trim()
                    .parse::<u32>()
                    .with_context(|| format!("Invalid group reference '{g}'"))
            })
            .collect::<Result<Vec<u32>>>()?;
        feature = feature.with_groups(groups);
    }
    Ok(feature)
}

pub fn read_run<R: BufRead>(id: usize, name: &str, reader: R) -> Result<AlignmentFile> {
    let mut features = Vec::new();
    let mut seen = HashSet::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {} of {name}", line_no + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("id") {
            continue;
        }
        let feature = parse_feature_line(id, trimmed)
            .with_context(|| format!("{name}:{}", line_no + 1))?;
        // features are keyed by (run, id)
        if !seen.insert(feature.id()) {
            bail!("duplicate feature id {} at {name}:{}", feature.id(), line_no + 1);
        }
        features.push(feature);
    }
    Ok(AlignmentFile::new(id, name, features))
}

/// Load a run; its name is the file stem
pub fn read_run_file<P: AsRef<Path>>(id: usize, path: P) -> Result<AlignmentFile> {
    let path = path.as_ref();
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("run")
        .to_string();
    let file = File::open(path)
        .with_context(|| format!("Failed to open run file {}", path.display()))?;
    read_run(id, &name, BufReader::new(file))
}

/// One line per row: position, average m/z and RT, size, then the feature
/// id contributed by each run (`NA` when absent)
pub fn write_alignment<W: Write>(
    mut writer: W,
    alignment: &AlignmentList,
    files: &[AlignmentFile],
) -> Result<()> {
    write!(writer, "row\tmz\trt\tsize")?;
    for file in files {
        write!(writer, "\t{}", file.name())?;
    }
    writeln!(writer)?;

    for (position, row) in alignment.rows().iter().enumerate() {
        write!(
            writer,
            "{}\t{:.6}\t{:.4}\t{}",
            position,
            row.avg_mz(),
            row.avg_rt(),
            row.len()
        )?;
        for file in files {
            match row.feature_from_file(file.id()) {
                Some(feature) => write!(writer, "\t{}", feature.id())?,
                None => write!(writer, "\tNA")?,
            }
        }
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_alignment_file<P: AsRef<Path>>(
    path: P,
    alignment: &AlignmentList,
    files: &[AlignmentFile],
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    write_alignment(BufWriter::new(file), alignment, files)
}
