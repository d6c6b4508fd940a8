use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output};

use tempfile::TempDir;

fn binary() -> &'static str {
    env!("CARGO_BIN_EXE_famflux")
}

struct Fixture {
    dir: TempDir,
    tree: PathBuf,
    families: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");

        let tree = dir.path().join("tree.nwk");
        fs::write(&tree, "((A:1,B:1):1,(C:1,D:1):1);\n").unwrap();

        let families = dir.path().join("families.tsv");
        let mut f = File::create(&families).unwrap();
        writeln!(f, "Desc\tFamily ID\tA\tB\tC\tD").unwrap();
        writeln!(f, "(null)\tF1\t5\t10\t2\t6").unwrap();
        writeln!(f, "(null)\tF2\t3\t3\t3\t3").unwrap();
        writeln!(f, "(null)\tF3\t1\t2\t1\t2").unwrap();
        writeln!(f, "(null)\tF4\t4\t4\t5\t4").unwrap();

        Fixture { dir, tree, families }
    }

    fn output_dir(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn run(args: &[&str]) -> Output {
    Command::new(binary())
        .args(args)
        .output()
        .expect("binary runs")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn fixed_rate_run_writes_the_full_results_directory() {
    let fx = Fixture::new();
    let out = fx.output_dir("fixed");
    let output = run(&[
        "-t",
        fx.tree.to_str().unwrap(),
        "-i",
        fx.families.to_str().unwrap(),
        "-l",
        "0.01",
        "-o",
        out.to_str().unwrap(),
        "--pvalue-sims",
        "25",
    ]);
    assert_success(&output);

    for file in [
        "results",
        "family_lks",
        "base_asr",
        "base_family_results",
        "base_clade_results",
    ] {
        let path = out.join(file);
        assert!(path.exists(), "{} missing", file);
        assert!(fs::metadata(&path).unwrap().len() > 0, "{} empty", file);
    }

    let results = fs::read_to_string(out.join("results")).unwrap();
    assert!(results.starts_with("Model base Result:"));
    assert!(results.contains("Lambda: 0.01"));

    let lks = fs::read_to_string(out.join("family_lks")).unwrap();
    assert!(lks.lines().count() >= 5); // header + four families

    let asr = fs::read_to_string(out.join("base_asr")).unwrap();
    assert!(asr.contains("#NEXUS"));
    assert!(asr.contains("TREE F1 ="));
    assert!(asr.contains("A_5"));
}

#[test]
fn estimation_is_reproducible_for_a_fixed_seed() {
    let fx = Fixture::new();
    let mut results = Vec::new();
    for name in ["seeded_a", "seeded_b"] {
        let out = fx.output_dir(name);
        let output = run(&[
            "-t",
            fx.tree.to_str().unwrap(),
            "-i",
            fx.families.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "--seed",
            "12345",
            "--pvalue-sims",
            "10",
            "--max-iters",
            "60",
        ]);
        assert_success(&output);
        results.push(fs::read_to_string(out.join("results")).unwrap());
    }
    assert_eq!(results[0], results[1]);
}

#[test]
fn gamma_run_reports_per_category_rows() {
    let fx = Fixture::new();
    let out = fx.output_dir("gamma");
    let output = run(&[
        "-t",
        fx.tree.to_str().unwrap(),
        "-i",
        fx.families.to_str().unwrap(),
        "-l",
        "0.01",
        "-k",
        "2",
        "-a",
        "0.5",
        "-o",
        out.to_str().unwrap(),
        "--pvalue-sims",
        "10",
    ]);
    assert_success(&output);

    let results = fs::read_to_string(out.join("results")).unwrap();
    assert!(results.starts_with("Model gamma Result:"));
    assert!(results.contains("Alpha: 0.5"));

    let lks = fs::read_to_string(out.join("family_lks")).unwrap();
    assert!(lks.contains("Gamma Cat Median"));
    // two category rows per family
    assert_eq!(lks.lines().count(), 1 + 4 * 2);
}

#[test]
fn conflicting_rate_flags_fail() {
    let fx = Fixture::new();
    let output = run(&[
        "-t",
        fx.tree.to_str().unwrap(),
        "-i",
        fx.families.to_str().unwrap(),
        "-l",
        "0.01",
        "-m",
        "0.01,0.02",
    ]);
    assert!(!output.status.success());
}

#[test]
fn multiple_rates_require_a_rate_tree() {
    let fx = Fixture::new();
    let output = run(&[
        "-t",
        fx.tree.to_str().unwrap(),
        "-i",
        fx.families.to_str().unwrap(),
        "-m",
        "0.01,0.02",
    ]);
    assert!(!output.status.success());
}

#[test]
fn simulation_output_round_trips_through_the_family_reader() {
    let fx = Fixture::new();
    let out = fx.output_dir("sims");
    let rootdist = fx.dir.path().join("rootdist.txt");
    fs::write(&rootdist, "5\t8\n10\t2\n").unwrap();

    let output = run(&[
        "-t",
        fx.tree.to_str().unwrap(),
        "-l",
        "0.01",
        "-f",
        rootdist.to_str().unwrap(),
        "-s",
        "12",
        "-o",
        out.to_str().unwrap(),
        "--seed",
        "7",
    ]);
    assert_success(&output);

    let sim = fs::read_to_string(out.join("simulation")).unwrap();
    let header_lines = sim.lines().filter(|l| l.starts_with('#')).count();
    assert_eq!(header_lines, 7); // every clade of the four-taxon tree
    let data_lines: Vec<&str> = sim.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(data_lines.len(), 12);
    for line in &data_lines {
        assert_eq!(line.split('\t').count(), 8);
    }

    // The row form feeds straight back into inference.
    let out2 = fx.output_dir("resim");
    let output = run(&[
        "-t",
        fx.tree.to_str().unwrap(),
        "-i",
        out.join("simulation").to_str().unwrap(),
        "-l",
        "0.01",
        "-o",
        out2.to_str().unwrap(),
        "--pvalue-sims",
        "5",
    ]);
    assert_success(&output);
    assert!(out2.join("family_lks").exists());
}

#[test]
fn chisquare_compare_prints_a_pvalue() {
    let output = run(&["-r", "100.0,102.0,1"]);
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("PValue = "), "stdout: {}", stdout);
    let value: f64 = stdout
        .trim()
        .rsplit(' ')
        .next()
        .unwrap()
        .parse()
        .expect("numeric p-value");
    // 2·(102−100) = 4 against χ²(1): p ≈ 0.0455
    assert!((value - 0.0455).abs() < 0.001, "p = {}", value);
}

#[test]
fn error_model_run_reports_epsilon() {
    let fx = Fixture::new();
    let errmodel = fx.dir.path().join("errmodel.txt");
    fs::write(
        &errmodel,
        "max: 70\ncnt: -1 0 1\n0 0.0 0.95 0.05\n1 0.05 0.9 0.05\n",
    )
    .unwrap();
    let out = fx.output_dir("errfit");
    let output = run(&[
        "-t",
        fx.tree.to_str().unwrap(),
        "-i",
        fx.families.to_str().unwrap(),
        "-e",
        errmodel.to_str().unwrap(),
        "-o",
        out.to_str().unwrap(),
        "--seed",
        "3",
        "--pvalue-sims",
        "5",
        "--max-iters",
        "30",
        "--tolx",
        "1e-3",
        "--tolf",
        "1e-3",
    ]);
    assert_success(&output);
    let results = fs::read_to_string(out.join("results")).unwrap();
    assert!(results.contains("Epsilon: "), "results:\n{}", results);
}

#[test]
fn absent_at_root_filter_drops_one_sided_families() {
    let fx = Fixture::new();
    let table = fx.dir.path().join("one_sided.tsv");
    let mut f = File::create(&table).unwrap();
    writeln!(f, "Desc\tFamily ID\tA\tB\tC\tD").unwrap();
    writeln!(f, "(null)\tboth\t2\t2\t2\t2").unwrap();
    writeln!(f, "(null)\tleft_only\t2\t3\t0\t0").unwrap();
    drop(f);

    let out = fx.output_dir("filtered");
    let output = run(&[
        "-t",
        fx.tree.to_str().unwrap(),
        "-i",
        table.to_str().unwrap(),
        "-l",
        "0.01",
        "-x",
        "-o",
        out.to_str().unwrap(),
        "--pvalue-sims",
        "5",
    ]);
    assert_success(&output);
    let lks = fs::read_to_string(out.join("family_lks")).unwrap();
    assert!(lks.contains("both"));
    assert!(!lks.contains("left_only"));
}
