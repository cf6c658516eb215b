use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use tabson::dbmd::{DatabaseMetadata, StoredMetadata};
use tabson::output::ts::{make_query_types_source, TsSourceOptions};
use tabson::output::{query_file_stem, write_query_sqls};
use tabson::restype::names::assign_type_names;
use tabson::restype::ResultTypeGenerator;
use tabson::spec::{PropertyNamer, QueryGroupSpec};
use tabson::sqlgen::SqlGenerator;

/// Generate nested-JSON SQL queries and matching result type declarations
/// from declarative query specs and a database metadata snapshot.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Database metadata JSON file produced by the introspection step
    dbmd_file: PathBuf,
    /// Query group specification JSON file
    query_specs_file: PathBuf,
    /// Directory receiving generated type declaration sources
    types_output_dir: PathBuf,
    /// Directory receiving generated SQL files
    sql_output_dir: PathBuf,
    /// Prefix for SQL file references in generated type sources, e.g. a
    /// resource directory path
    #[arg(long, default_value = "")]
    sql_resource_path_prefix: String,
    /// File whose contents are prepended to each generated type source
    #[arg(long)]
    types_file_header: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let dbmd_json = fs::read_to_string(&cli.dbmd_file)
        .with_context(|| format!("reading database metadata file '{}'", cli.dbmd_file.display()))?;
    let stored: StoredMetadata =
        serde_json::from_str(&dbmd_json).context("parsing database metadata")?;
    let dbmd = DatabaseMetadata::new(stored);

    let specs_json = fs::read_to_string(&cli.query_specs_file).with_context(|| {
        format!("reading query specs file '{}'", cli.query_specs_file.display())
    })?;
    let group: QueryGroupSpec =
        serde_json::from_str(&specs_json).context("parsing query group spec")?;

    fs::create_dir_all(&cli.sql_output_dir)
        .with_context(|| format!("creating '{}'", cli.sql_output_dir.display()))?;
    fs::create_dir_all(&cli.types_output_dir)
        .with_context(|| format!("creating '{}'", cli.types_output_dir.display()))?;

    let types_file_header = match &cli.types_file_header {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("reading types file header '{}'", path.display()))?,
        ),
        None => None,
    };
    let ts_opts = TsSourceOptions {
        sql_resource_path_prefix: cli.sql_resource_path_prefix.clone(),
        types_file_header,
    };

    let namer = PropertyNamer::new(group.property_naming_default, dbmd.case_sensitivity);
    let sql_generator = SqlGenerator::new(
        &dbmd,
        group.default_schema.clone(),
        &group.unqualified_name_schemas,
        namer,
        2,
    )?;
    let type_generator = ResultTypeGenerator::new(&dbmd, group.default_schema.clone(), namer);

    for query_spec in &group.queries {
        let repr_sqls = sql_generator.generate_sqls(query_spec)?;
        let sql_paths = write_query_sqls(&query_spec.query_name, &repr_sqls, &cli.sql_output_dir)?;

        if query_spec.generate_result_types.unwrap_or(true) {
            let descriptors = type_generator.generate(query_spec)?;
            let type_names = assign_type_names(&descriptors);
            let types_src =
                make_query_types_source(query_spec, &descriptors, &type_names, &sql_paths, &ts_opts)?;

            let types_path = cli
                .types_output_dir
                .join(format!("{}.ts", query_file_stem(&query_spec.query_name)));
            fs::write(&types_path, types_src)
                .with_context(|| format!("writing types source '{}'", types_path.display()))?;
            info!(query = %query_spec.query_name, file = %types_path.display(),
                "wrote result types source");
        }
    }

    Ok(())
}
