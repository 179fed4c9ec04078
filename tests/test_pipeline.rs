/// Progressive alignment pipeline and command-line tests
///
/// Random guide trees check the merge bookkeeping; the CLI tests run the
/// built binary on small run tables written to a temporary directory.
use anyhow::Result;
use multialign::driver::ProgressiveAligner;
use multialign::guide_tree::GuideTree;
use multialign::library::{build_libraries, JoinLibraryBuilder};
use multialign::{AlignmentFile, MatchingStrategy, Merger, Scorer, ToleranceWindow};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn synthetic_runs(count: usize, seed: u64) -> Vec<AlignmentFile> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|id| {
            let peaks: Vec<(u32, f64, f64, f64)> = (0..rng.gen_range(1..6))
                .map(|i| {
                    (
                        i,
                        100.0 + rng.gen_range(0..4) as f64 * 50.0 + rng.gen_range(0.0..0.002),
                        10.0 + rng.gen_range(0.0..0.5),
                        rng.gen_range(1.0..100.0),
                    )
                })
                .collect();
            AlignmentFile::from_tuples(id, format!("run{id}"), &peaks)
        })
        .collect()
}

/// Split the leaves into two or three random groups, recursively
fn random_tree(mut leaves: Vec<usize>, rng: &mut StdRng, counter: &mut usize) -> GuideTree {
    if leaves.len() == 1 {
        return GuideTree::leaf(leaves[0], format!("run{}", leaves[0]));
    }
    leaves.shuffle(rng);
    let groups = rng.gen_range(2..=leaves.len().min(3));
    let mut cuts: Vec<usize> = (1..leaves.len()).collect();
    cuts.shuffle(rng);
    let mut cuts: Vec<usize> = cuts.into_iter().take(groups - 1).collect();
    cuts.sort_unstable();

    let mut children = Vec::new();
    let mut start = 0;
    for cut in cuts.into_iter().chain(std::iter::once(leaves.len())) {
        children.push(random_tree(leaves[start..cut].to_vec(), rng, counter));
        start = cut;
    }
    *counter += 1;
    GuideTree::node(format!("node{counter}"), 0.5, children)
}

/// Property: any tree over R runs performs R - 1 merges, and every feature
/// in a multi-feature row is owned by exactly that row
#[test]
fn prop_progressive_merge_bookkeeping() {
    proptest!(|(runs in 1usize..7, seed in any::<u64>(), strategy_index in 0usize..4)| {
        let strategy = [
            MatchingStrategy::Stable,
            MatchingStrategy::Optimal,
            MatchingStrategy::Greedy,
            MatchingStrategy::SociallyConstrained,
        ][strategy_index];
        let files = synthetic_runs(runs, seed);
        let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed);
        let tree = random_tree((0..runs).collect(), &mut rng, &mut 0);
        prop_assert_eq!(tree.leaf_count(), runs);

        let scorer = Scorer::unweighted(&files);
        let merger = Merger::new(strategy, &scorer, ToleranceWindow::new(0.01, 1.0, false));
        let mut aligner = ProgressiveAligner::new(&files, merger);
        let alignment = aligner.align(&tree).unwrap();

        prop_assert_eq!(aligner.merge_count(), runs - 1);
        let total: usize = files.iter().map(|f| f.len()).sum();
        prop_assert_eq!(alignment.feature_count(), total);

        for row in alignment.rows() {
            let mut seen_files = std::collections::HashSet::new();
            for feature in row.features() {
                prop_assert!(seen_files.insert(feature.file()), "row {} holds two features of run {}", row.key(), feature.file());
                let owner = aligner.ownership().owner(&feature.key());
                if row.len() > 1 {
                    prop_assert_eq!(owner, Some(row.key()));
                } else {
                    prop_assert_eq!(owner, None);
                }
            }
        }
    });
}

/// Property: one library per unordered pair of runs
#[test]
fn prop_library_per_run_pair() {
    proptest!(|(runs in 1usize..7, seed in any::<u64>())| {
        let files = synthetic_runs(runs, seed);
        let build = build_libraries(
            &files,
            &JoinLibraryBuilder::default(),
            &ToleranceWindow::new(10.0, 1.0, true),
        );
        prop_assert!(build.failures.is_empty());
        prop_assert_eq!(build.libraries.len(), runs * (runs - 1) / 2);
        for library in &build.libraries {
            prop_assert!(library.first_file < library.second_file);
        }
    });
}

fn write_runs(dir: &TempDir) -> Result<Vec<String>> {
    let runs = [
        ("a", "id\tmass\trt\tintensity\n0\t100.0\t10.0\t5\n1\t200.0\t20.0\t3\n"),
        ("b", "0\t100.001\t10.1\t4\n1\t200.0\t20.2\t2\n"),
        ("c", "# no header\n0\t100.0\t10.2\t9\n1\t300.0\t30.0\t1\n"),
    ];
    let mut paths = Vec::new();
    for (name, text) in runs {
        let path = dir.path().join(format!("{name}.tsv"));
        fs::write(&path, text)?;
        paths.push(path.to_string_lossy().into_owned());
    }
    Ok(paths)
}

/// Test the full command line: three runs in, one table out
#[test]
fn test_cli_round_trip() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let runs = write_runs(&temp_dir)?;
    let output_path = temp_dir.path().join("out.tsv");

    for strategy in ["stable", "optimal", "greedy", "social"] {
        let output = Command::new(env!("CARGO_BIN_EXE_multialign"))
            .args(&runs)
            .args(["-m", "0.01", "--absolute-mass", "-r", "1", "-t", "2"])
            .args(["-s", strategy, "--print-tree", "-q", "-o"])
            .arg(&output_path)
            .output()?;
        assert!(
            output.status.success(),
            "{strategy} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );

        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("- a") && stderr.contains("- c"), "tree missing: {stderr}");

        let table = fs::read_to_string(&output_path)?;
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "row\tmz\trt\tsize\ta\tb\tc");
        assert_eq!(lines.len(), 4, "{strategy}: {table}");

        let mut sizes: Vec<&str> = lines[1..]
            .iter()
            .map(|line| line.split('\t').nth(3).unwrap_or(""))
            .collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec!["1", "2", "3"], "{strategy}");
    }
    Ok(())
}

/// Test that the table goes to stdout without -o
#[test]
fn test_cli_writes_stdout() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let runs = write_runs(&temp_dir)?;

    let output = Command::new(env!("CARGO_BIN_EXE_multialign"))
        .args(&runs)
        .args(["-m", "0.01", "--absolute-mass", "-r", "1", "-q"])
        .output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("row\tmz\trt\tsize\ta\tb\tc\n"));
    assert_eq!(stdout.lines().count(), 4);
    Ok(())
}

/// Test handling of a malformed run table
#[test]
fn test_cli_rejects_malformed_run() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let good = temp_dir.path().join("good.tsv");
    let broken = temp_dir.path().join("broken.tsv");
    fs::write(&good, "0\t100.0\t10.0\t1\n")?;
    fs::write(&broken, "0\t100.0\tfast\t1\n")?;

    let output = Command::new(env!("CARGO_BIN_EXE_multialign"))
        .arg(&good)
        .arg(&broken)
        .output()?;
    assert!(!output.status.success(), "malformed run should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("broken:1"), "got: {stderr}");
    assert!(stderr.contains("retention time"), "got: {stderr}");

    let output = Command::new(env!("CARGO_BIN_EXE_multialign"))
        .arg(temp_dir.path().join("missing.tsv"))
        .output()?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to open run file"));
    Ok(())
}

/// Test that a run reusing a feature id is reported as bad input
#[test]
fn test_cli_rejects_duplicate_feature_ids() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let good = temp_dir.path().join("good.tsv");
    let sample = temp_dir.path().join("sample.tsv");
    fs::write(&good, "0\t100.0\t10.0\t1\n1\t200.0\t20.0\t1\n")?;
    fs::write(&sample, "0\t100.0\t10.0\t5\n0\t200.0\t20.0\t3\n")?;

    let output = Command::new(env!("CARGO_BIN_EXE_multialign"))
        .arg(&good)
        .arg(&sample)
        .args(["-m", "0.01", "--absolute-mass", "-r", "1"])
        .output()?;
    assert!(!output.status.success(), "duplicate ids should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("duplicate feature id 0 at sample:2"), "got: {stderr}");
    assert!(!stderr.contains("already owned"), "got: {stderr}");
    Ok(())
}

/// Test that RUST_LOG is honoured unless -q or -v is given
#[test]
fn test_cli_log_level_sources() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let runs = write_runs(&temp_dir)?;
    let run = |extra: &[&str]| -> Result<String> {
        let output = Command::new(env!("CARGO_BIN_EXE_multialign"))
            .args(&runs)
            .args(["-m", "0.01", "--absolute-mass", "-r", "1"])
            .args(extra)
            .env("RUST_LOG", "debug")
            .output()?;
        assert!(output.status.success());
        Ok(String::from_utf8_lossy(&output.stderr).into_owned())
    };

    let from_env = run(&[])?;
    assert!(from_env.contains("combined library holds"), "got: {from_env}");

    let quiet = run(&["-q"])?;
    assert!(!quiet.contains("combined library holds"), "got: {quiet}");
    assert!(!quiet.contains("aligned 3 runs"), "got: {quiet}");
    Ok(())
}

/// Test that invalid settings are refused before any work starts
#[test]
fn test_cli_rejects_bad_settings() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let runs = write_runs(&temp_dir)?;

    let output = Command::new(env!("CARGO_BIN_EXE_multialign"))
        .args(&runs)
        .args(["-w", "0.5"])
        .output()?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("RT window multiplier"));

    let output = Command::new(env!("CARGO_BIN_EXE_multialign"))
        .args(&runs)
        .args(["-s", "bogus"])
        .output()?;
    assert!(!output.status.success());
    Ok(())
}
