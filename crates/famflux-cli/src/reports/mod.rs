//! Writers for the results directory plus the terminal summary.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use comfy_table::{presets::UTF8_FULL, Table};

use famflux_core::error::FfResult;
use famflux_core::model::FamilyInfo;
use famflux_core::rates::Rate;
use famflux_core::reconstruct::FamilyReconstruction;
use famflux_core::tree::Tree;

pub fn create_output_dir(prefix: &Path) -> FfResult<()> {
    fs::create_dir_all(prefix)?;
    Ok(())
}

pub fn filename(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}

/// Interior non-root clades in a stable order; the column layout of the
/// family and clade reports.
fn report_clades(tree: &Tree) -> Vec<usize> {
    tree.interior_nodes()
        .into_iter()
        .filter(|&id| !tree.is_root(id))
        .collect()
}

pub fn write_results(
    dir: &Path,
    model_name: &str,
    score: f64,
    rate: &Rate,
    alpha: Option<f64>,
    epsilon: Option<f64>,
    tree: &Tree,
) -> FfResult<()> {
    let mut out = BufWriter::new(File::create(filename(dir, "results"))?);
    writeln!(out, "Model {} Result: {}", model_name, score)?;
    writeln!(out, "Lambda: {}", rate)?;
    if let Some(alpha) = alpha {
        writeln!(out, "Alpha: {}", alpha)?;
    }
    if let Some(epsilon) = epsilon {
        writeln!(out, "Epsilon: {}", epsilon)?;
    }

    // Interior-node heights, deepest tip taken as the present.
    let depths = tree.depths();
    let max_depth = depths.iter().copied().fold(0.0, f64::max);
    writeln!(out)?;
    for id in tree.interior_nodes() {
        writeln!(out, "{}\t{}", tree.name(id), max_depth - depths[id])?;
    }
    Ok(())
}

pub fn write_family_likelihoods(dir: &Path, stash: &[FamilyInfo], gamma: bool) -> FfResult<()> {
    let mut out = BufWriter::new(File::create(filename(dir, "family_lks"))?);
    if gamma {
        writeln!(
            out,
            "#FamilyID\tGamma Cat Median\tLikelihood of Category\tLikelihood of Family\t\
             Posterior Probability\tSignificant"
        )?;
        for row in stash {
            writeln!(out, "{}", row)?;
        }
    } else {
        writeln!(out, "#FamilyID\tLikelihood of Family")?;
        for row in stash {
            writeln!(out, "{}\t{}", row.family_id, row.family_likelihood)?;
        }
    }
    Ok(())
}

/// Nexus-style trees annotated with `name_count` at every node.
pub fn write_asr(
    dir: &Path,
    model_name: &str,
    tree: &Tree,
    reconstructions: &[FamilyReconstruction],
) -> FfResult<()> {
    let mut out = BufWriter::new(File::create(
        filename(dir, &format!("{}_asr", model_name)),
    )?);
    writeln!(out, "#NEXUS")?;
    writeln!(out, "BEGIN TREES;")?;
    for rec in reconstructions {
        let annotated = tree.write_newick(&|id| format!("{}_{}", tree.name(id), rec.sizes[id]));
        writeln!(out, "  TREE {} = {}", rec.family_id, annotated)?;
        if rec.category_sizes.len() > 1 {
            for (k, sizes) in rec.category_sizes.iter().enumerate() {
                let annotated =
                    tree.write_newick(&|id| format!("{}_{}", tree.name(id), sizes[id]));
                writeln!(out, "  TREE {}_cat{} = {}", rec.family_id, k + 1, annotated)?;
            }
        }
    }
    writeln!(out, "END;")?;
    Ok(())
}

/// Per-family change labels and p-values, tab separated.
pub fn write_family_results(
    dir: &Path,
    model_name: &str,
    tree: &Tree,
    reconstructions: &[FamilyReconstruction],
    pvalues: &[f64],
) -> FfResult<()> {
    let clades = report_clades(tree);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(filename(dir, &format!("{}_family_results", model_name)))?;

    let mut header = vec!["#FamilyID".to_string(), "pvalue".to_string(), "*".to_string()];
    header.extend(clades.iter().map(|&id| tree.name(id).to_string()));
    writer.write_record(&header)?;

    for (rec, pvalue) in reconstructions.iter().zip(pvalues) {
        let mut record = vec![
            rec.family_id.clone(),
            pvalue.to_string(),
            if *pvalue < 0.05 { "y" } else { "n" }.to_string(),
        ];
        record.extend(clades.iter().map(|&id| {
            rec.changes[id]
                .map(|c| c.to_string())
                .unwrap_or_else(|| "c".to_string())
        }));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Increase/decrease totals per interior clade across all families.
pub fn write_clade_results(
    dir: &Path,
    model_name: &str,
    tree: &Tree,
    reconstructions: &[FamilyReconstruction],
) -> FfResult<()> {
    use famflux_core::reconstruct::SizeChange;

    let clades = report_clades(tree);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(filename(dir, &format!("{}_clade_results", model_name)))?;
    writer.write_record(["#Taxon_ID", "Increase", "Decrease"])?;

    for &id in &clades {
        let mut increases = 0usize;
        let mut decreases = 0usize;
        for rec in reconstructions {
            match rec.changes[id] {
                Some(SizeChange::Increase) => increases += 1,
                Some(SizeChange::Decrease) => decreases += 1,
                _ => {}
            }
        }
        writer.write_record([
            tree.name(id).to_string(),
            increases.to_string(),
            decreases.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn print_summary(
    model_name: &str,
    score: f64,
    rate: &Rate,
    alpha: Option<f64>,
    epsilon: Option<f64>,
) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["Model", "-lnL", "Lambda", "Alpha", "Epsilon"]);
    table.add_row([
        model_name.to_string(),
        format!("{:.4}", score),
        rate.to_string(),
        alpha.map(|a| format!("{:.4}", a)).unwrap_or_else(|| "-".into()),
        epsilon
            .map(|e| format!("{:.4}", e))
            .unwrap_or_else(|| "-".into()),
    ]);
    println!("{table}");
}
