use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "class-reports",
    about = "Generate one DOCX report per student from a grades sheet, a template and photos"
)]
struct Args {
    /// Run configuration (paths and picture slots)
    #[arg(short, long, default_value = "class-reports.toml")]
    config: PathBuf,
    /// Only generate the first N students' reports
    #[arg(long)]
    limit: Option<usize>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !args.config.is_file() {
        eprintln!("Error: config file not found: {}", args.config.display());
        std::process::exit(1);
    }

    match class_reports::generate_reports(&args.config, args.limit) {
        Ok(summary) if summary.failures.is_empty() => {}
        Ok(summary) => {
            for (student, e) in &summary.failures {
                eprintln!("Error: {student}: {e}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
