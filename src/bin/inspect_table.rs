use panelwave::{clean::missing_values, table::load_table, Table};
use std::{env, path::Path, process::exit};

fn main() {
    // Expect exactly one CLI argument: path to a .csv or .parquet file.
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <DATA_FILE>", args[0]);
        exit(1);
    }
    if let Err(e) = inspect_table(Path::new(&args[1])) {
        eprintln!("Error: {}", e);
        exit(1);
    }
}

/// Load the table and print its shape, columns, value labels and nulls.
fn inspect_table(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let table = load_table(path)?;

    println!("=== Table: {} ===", path.display());
    println!("Rows:            {}", table.num_rows());
    println!("Columns:         {}", table.num_columns());
    println!("Labeled columns: {}", table.all_labels().len());
    println!();

    println!("=== Columns ===");
    for (field, (_, nulls)) in table.schema().fields().iter().zip(missing_values(&table)) {
        println!(
            "- {:<30} | {:<24} | nulls: {}",
            field.name(),
            format!("{}", field.data_type()),
            nulls
        );
    }
    println!();

    print_labels(&table);
    Ok(())
}

fn print_labels(table: &Table) {
    if table.all_labels().is_empty() {
        println!("=== Value Labels: <none> ===");
        return;
    }
    println!("=== Value Labels ===");
    for (column, labels) in table.all_labels() {
        println!("> {}", column);
        for (code, label) in labels.iter() {
            println!("    {:>6} = {}", code, label);
        }
    }
}
