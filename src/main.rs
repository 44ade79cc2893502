use anyhow::{Context, Result};
use clap::Parser;
use panelwave::{
    config::PanelConfig,
    pipeline::{self, AttritionReport, FactorTest},
    stats::{Frequencies, Normalize},
    table::write_table,
};
use prettytable::{format, Cell, Row, Table as TextTable};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Attrition analysis for a two-wave household survey panel
#[derive(Parser, Debug)]
#[command(name = "panelwave", version)]
struct Args {
    /// YAML config; every field is optional
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Baseline (pre-wave) data file, .csv or .parquet
    #[arg(long)]
    baseline: Option<PathBuf>,

    /// Follow-up (post-wave) data file, .csv or .parquet
    #[arg(long)]
    followup: Option<PathBuf>,

    /// Significance level for the chi-square tests
    #[arg(long)]
    alpha: Option<f64>,

    /// Write the merged table here (.csv or .parquet)
    #[arg(long)]
    export: Option<PathBuf>,

    /// Percentages in the factor tables
    #[arg(long, value_enum, default_value_t = Normalize::Rows)]
    percent: Normalize,

    /// Print the report as JSON instead of tables
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PanelConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PanelConfig::default(),
    };
    if let Some(p) = args.baseline {
        config.baseline = p;
    }
    if let Some(p) = args.followup {
        config.followup = p;
    }
    if let Some(a) = args.alpha {
        config.alpha = a;
    }
    config.validate()?;

    info!(
        baseline = %config.baseline.display(),
        followup = %config.followup.display(),
        "starting"
    );
    let report = pipeline::load_and_run(&config).context("attrition pipeline failed")?;

    if let Some(path) = &args.export {
        write_table(&report.merged, path)
            .with_context(|| format!("exporting merged table to {}", path.display()))?;
        info!(path = %path.display(), "exported merged table");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_summary(&report);
    print_frequencies(&report.completion);
    print_frequencies(&report.reinterview);
    print_frequencies(&report.age_groups);
    for test in &report.tests {
        print_factor(test, args.percent, report.alpha);
    }
    Ok(())
}

fn boxed() -> TextTable {
    let mut table = TextTable::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);
    table
}

fn header(cells: &[&str]) -> Row {
    Row::new(cells.iter().map(|c| Cell::new(c).style_spec("bFg")).collect())
}

fn print_summary(report: &AttritionReport) {
    let mut table = boxed();
    table.add_row(header(&["Stage", "Rows"]));
    for (stage, n) in [
        ("baseline loaded", report.baseline_rows),
        ("excluded outcomes", report.removed_outcomes),
        ("baseline cleaned", report.cleaned_rows),
        ("follow-up loaded", report.followup_rows),
        ("matched in both waves", report.matched),
        ("follow-up ids not in baseline", report.unmatched_followup),
        ("merged", report.merged.num_rows()),
    ] {
        table.add_row(Row::new(vec![
            Cell::new(stage),
            Cell::new(&n.to_string()).style_spec("r"),
        ]));
    }
    println!("\n--- Panel Summary ---");
    table.printstd();

    for w in &report.warnings {
        println!("warning: {}", w);
    }
    for (column, n) in report.missing.iter().filter(|(_, n)| *n > 0) {
        println!("note: `{}` has {} missing value(s)", column, n);
    }
}

fn print_frequencies(freq: &Frequencies) {
    let mut table = boxed();
    table.add_row(header(&[freq.column.as_str(), "Count", "%"]));
    for f in &freq.rows {
        table.add_row(Row::new(vec![
            Cell::new(&f.category),
            Cell::new(&f.count.to_string()).style_spec("r"),
            Cell::new(&format!("{:.1}", f.percent)).style_spec("r"),
        ]));
    }
    if freq.missing > 0 {
        table.add_row(Row::new(vec![
            Cell::new("(missing)"),
            Cell::new(&freq.missing.to_string()).style_spec("r"),
            Cell::new(""),
        ]));
    }
    println!("\n--- {} ---", freq.column);
    table.printstd();
}

fn print_factor(test: &FactorTest, normalize: Normalize, alpha: f64) {
    let ct = &test.contingency;
    let pct = ct.percentages(normalize);

    let mut table = boxed();
    let mut head: Vec<&str> = vec![ct.row_variable.as_str()];
    head.extend(ct.col_labels.iter().map(String::as_str));
    head.push("Total");
    table.add_row(header(&head));

    let totals = ct.row_totals();
    for (i, label) in ct.row_labels.iter().enumerate() {
        let mut cells = vec![Cell::new(label)];
        for (j, count) in ct.counts[i].iter().enumerate() {
            cells.push(Cell::new(&format!("{} ({:.1}%)", count, pct[i][j])).style_spec("r"));
        }
        cells.push(Cell::new(&totals[i].to_string()).style_spec("r"));
        table.add_row(Row::new(cells));
    }

    let chi = &test.chi_square;
    println!("\n--- {} × {} ---", ct.row_variable, ct.col_variable);
    table.printstd();
    println!(
        "chi² = {:.3}, dof = {}, p = {:.4} {}",
        chi.statistic,
        chi.dof,
        chi.p_value,
        if test.significant {
            format!("(significant at α = {})", alpha)
        } else {
            format!("(not significant at α = {})", alpha)
        }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_parses_to_normalize() {
        let args = Args::try_parse_from(["panelwave"]).unwrap();
        assert_eq!(args.percent, Normalize::Rows);

        let args = Args::try_parse_from(["panelwave", "--percent", "columns"]).unwrap();
        assert_eq!(args.percent, Normalize::Columns);

        assert!(Args::try_parse_from(["panelwave", "--percent", "cols"]).is_err());
    }
}
