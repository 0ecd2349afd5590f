use std::sync::Once;

use clap::Parser;

use tally::cli::{self, CacheCommands, CategoriesCommands, CellCommands, Cli, Commands, EntriesCommands};

static TRACING_INIT: Once = Once::new();

fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tally=warn"));

        fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    });
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        None => cli::grid::run(None, false),
        Some(Commands::Init { data_dir, user }) => cli::init::run(data_dir, user),
        Some(Commands::Status) => cli::status::run(),
        Some(Commands::Categories { command }) => match command {
            CategoriesCommands::Add {
                name,
                category_type,
                parent,
            } => cli::categories::add(&name, &category_type, parent),
            CategoriesCommands::List => cli::categories::list(),
            CategoriesCommands::Rename { id, name } => cli::categories::rename(id, &name),
            CategoriesCommands::Move { id, parent } => cli::categories::move_to(id, parent),
            CategoriesCommands::Delete { id, yes } => cli::categories::delete(id, yes),
        },
        Some(Commands::Grid { year, cached }) => cli::grid::run(year, cached),
        Some(Commands::Cell { command }) => match command {
            CellCommands::Show { category, month } => cli::cell::show(category, &month),
            CellCommands::Set {
                category,
                month,
                amount,
            } => cli::cell::set(category, &month, amount),
            CellCommands::Copy {
                category,
                month,
                targets,
            } => cli::cell::copy(category, &month, &targets),
        },
        Some(Commands::Entries { command }) => match command {
            EntriesCommands::Amount { id, amount } => cli::entries::amount(id, amount),
            EntriesCommands::Note { id, note } => cli::entries::note(id, note),
            EntriesCommands::Include { id } => cli::entries::set_included(id, true),
            EntriesCommands::Exclude { id } => cli::entries::set_included(id, false),
            EntriesCommands::Delete { id } => cli::entries::delete(id),
        },
        Some(Commands::Cache { command }) => match command {
            CacheCommands::Clear { year } => cli::cache::clear(year),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
