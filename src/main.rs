use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use unicode_width::UnicodeWidthStr;

use sqlshim::config::{DatabaseConfig, Driver};
use sqlshim::db::{format_values, import_schema, params_from_json, Backend, Database, Param, ResultSet};
use sqlshim::massage::QueryMassager;

/// Run PostgreSQL-dialect schemas and queries against SQLite
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import PostgreSQL schema scripts into a SQLite database
    Import {
        /// SQLite database file, created if missing
        #[arg(long)]
        database: PathBuf,
        /// Do not echo each statement
        #[arg(long, short)]
        quiet: bool,
        /// Schema scripts, imported in order
        #[arg(required = true)]
        schema: Vec<PathBuf>,
    },
    /// Show how a query would be rewritten for SQLite
    Translate {
        /// Parameters as a JSON array; nested arrays are containers
        #[arg(long)]
        params: Option<String>,
        query: String,
    },
    /// Execute a query through the configured backend
    Query {
        /// Config file (defaults to the user config directory)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Parameters as a JSON array; nested arrays are containers
        #[arg(long)]
        params: Option<String>,
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt::init();

    match Cli::parse().command {
        Command::Import {
            database,
            quiet,
            schema,
        } => import(&database, &schema, quiet),
        Command::Translate { params, query } => translate(&query, params.as_deref()),
        Command::Query {
            config,
            params,
            query,
        } => run_query(config, &query, params.as_deref()).await,
    }
}

fn parse_params(params: Option<&str>) -> Result<Vec<Param>> {
    match params {
        Some(text) => params_from_json(text).context("--params must be a JSON array"),
        None => Ok(Vec::new()),
    }
}

fn import(database: &Path, schema: &[PathBuf], quiet: bool) -> Result<ExitCode> {
    let report = import_schema(database, schema, quiet)
        .with_context(|| format!("failed to import into {}", database.display()))?;

    if report.succeeded() {
        if !quiet {
            println!(
                "{} statements executed, {} skipped, {} enum types",
                report.executed,
                report.skipped,
                report.enums.len()
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    eprintln!("{} statements failed; nothing committed", report.failures.len());
    for failure in &report.failures {
        eprintln!("  {:?}: {}", failure.kind, failure.message);
        eprintln!("    {}", failure.translated.as_deref().unwrap_or(&failure.statement));
    }
    Ok(ExitCode::FAILURE)
}

fn translate(query: &str, params: Option<&str>) -> Result<ExitCode> {
    let massager = QueryMassager::new()?;
    let massaged = massager.massage(query, parse_params(params)?)?;

    println!("{}", massaged.query);
    if !massaged.params.is_empty() {
        println!("params: {}", format_values(&massaged.params));
    }
    if let Some(nulls) = massaged.flags.nulls {
        println!("nulls: {:?}", nulls);
    }
    if massaged.flags.returning_id {
        println!("returning: id");
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_query(config: Option<PathBuf>, query: &str, params: Option<&str>) -> Result<ExitCode> {
    let path = config.unwrap_or_else(DatabaseConfig::default_path);
    let mut config = DatabaseConfig::load(&path)?;

    // Resolve password: PGPASSWORD env var, then interactive prompt
    if config.driver == Driver::Postgresql && config.postgresql.password.is_empty() {
        if let Ok(pw) = std::env::var("PGPASSWORD") {
            config.postgresql.password = pw;
        } else {
            let prompt = format!("Password for {}: ", config.postgresql.display_string());
            config.postgresql.password = rpassword::read_password_from_tty(Some(&prompt))?;
        }
    }

    let params = parse_params(params)?;
    let mut database = Database::connect(&config).await?;
    let mut cursor = database.cursor();
    cursor.execute(query, params).await?;
    match cursor.result() {
        Some(result) if !result.columns.is_empty() => print_table(result),
        _ => println!("{} rows affected", cursor.rowcount().unwrap_or(0)),
    }

    database.commit().await?;
    database.close().await?;
    Ok(ExitCode::SUCCESS)
}

fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    format!("{}{}", text, " ".repeat(fill))
}

fn print_table(result: &ResultSet) {
    let header: Vec<String> = result
        .columns
        .iter()
        .map(|c| pad(&c.name, c.max_width))
        .collect();
    println!("{}", header.join(" | "));

    let rule: Vec<String> = result
        .columns
        .iter()
        .map(|c| "-".repeat(c.max_width))
        .collect();
    println!("{}", rule.join("-+-"));

    for row in &result.rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&result.columns)
            .map(|(cell, c)| pad(&cell.display(), c.max_width))
            .collect();
        println!("{}", cells.join(" | "));
    }
    println!(
        "({} rows, {:.1} ms)",
        result.row_count(),
        result.execution_time.as_secs_f64() * 1000.0
    );
}
