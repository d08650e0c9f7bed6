use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wikiseek::block::Bz2Archive;
use wikiseek::cache;
use wikiseek::config::{CHUNK_SIZE, DEFAULT_EXPLORE_DEPTH, DEFAULT_MAX_ENTRIES};
use wikiseek::content::{PlainTextRenderer, RawRenderer, Renderer};
use wikiseek::explore::Explorer;
use wikiseek::indexer::{self, IndexFilter};
use wikiseek::progress::{Progress, VisitOutcome};
use wikiseek::reader::{IndexSource, Listing, MultistreamReader};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "wikiseek")]
#[command(about = "Index and read Wikipedia multistream bzip2 dumps")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv); RUST_LOG overrides it
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the binary index by scanning the whole archive
    Rebuild(RebuildArgs),
    /// Walk the link graph from a seed title and write a derived index
    Explore(ExploreArgs),
    /// Print index entries as CSV
    List(ListArgs),
    /// Print pages for a range of index positions as JSON lines
    Show(ShowArgs),
}

#[derive(Args)]
struct RebuildArgs {
    /// Multistream archive (.xml.bz2)
    #[arg(short, long)]
    input: PathBuf,

    /// Binary index to write
    #[arg(short, long)]
    output: PathBuf,

    /// Bytes read from the archive per decompressor feed
    #[arg(long, default_value_t = CHUNK_SIZE)]
    chunk_size: usize,

    /// Title prefix to leave out (repeatable, replaces the defaults)
    #[arg(long = "exclude-prefix")]
    exclude_prefixes: Vec<String>,
}

#[derive(Args)]
struct ExploreArgs {
    /// Multistream archive (.xml.bz2)
    #[arg(short, long)]
    input: PathBuf,

    /// Text index shipped with the archive (offset:id:title, plain or .bz2)
    #[arg(long)]
    text_index: PathBuf,

    /// Binary index to write
    #[arg(short, long)]
    output: PathBuf,

    /// Title to start from
    #[arg(long)]
    seed: String,

    /// Maximum link distance from the seed
    #[arg(long, default_value_t = DEFAULT_EXPLORE_DEPTH)]
    depth: u32,

    /// Stop after this many accepted titles
    #[arg(long, default_value_t = DEFAULT_MAX_ENTRIES)]
    max_entries: usize,

    /// Force a rebuild of the title cache
    #[arg(long)]
    no_cache: bool,
}

#[derive(Args)]
struct RangeArgs {
    /// Index to read
    #[arg(long)]
    index: PathBuf,

    /// Treat the index as a legacy text index
    #[arg(long)]
    text: bool,

    /// First index position
    #[arg(long, default_value_t = 0)]
    start: u64,

    /// Number of positions
    #[arg(long, default_value_t = 10)]
    count: usize,
}

impl RangeArgs {
    fn source(&self) -> Result<IndexSource> {
        if self.text {
            Ok(IndexSource::text(&self.index))
        } else {
            IndexSource::binary(&self.index)
                .with_context(|| format!("Failed to open index: {}", self.index.display()))
        }
    }
}

#[derive(Args)]
struct ListArgs {
    #[command(flatten)]
    range: RangeArgs,
}

#[derive(Args)]
struct ShowArgs {
    /// Multistream archive (.xml.bz2)
    #[arg(short, long)]
    input: PathBuf,

    #[command(flatten)]
    range: RangeArgs,

    /// Print raw wikitext instead of plain text
    #[arg(long)]
    raw: bool,
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn run_rebuild(args: RebuildArgs) -> Result<()> {
    let archive = Bz2Archive::new(&args.input).with_chunk_size(args.chunk_size);
    let filter = if args.exclude_prefixes.is_empty() {
        IndexFilter::default()
    } else {
        IndexFilter::with_prefixes(&args.exclude_prefixes)
    };

    let start = Instant::now();
    let pb = spinner();
    let mut on_progress = |event: &Progress| match event {
        Progress::BlockIndexed { entries_total, .. } => {
            pb.set_message(format!("{} entries", entries_total));
        }
        Progress::BlockSkipped { offset, reason, .. } => {
            pb.println(format!("Skipped block at {}: {}", offset, reason));
        }
        Progress::TitleVisited { .. } => {}
    };

    let stats = indexer::rebuild(&archive, &args.output, &filter, &mut on_progress)
        .with_context(|| format!("Failed to rebuild index from: {}", args.input.display()))?;
    pb.finish_and_clear();

    println!();
    println!("=== Summary ===");
    println!("Total time:         {:.2}s", start.elapsed().as_secs_f64());
    println!("Blocks read:        {}", stats.blocks_read);
    println!("Blocks skipped:     {}", stats.blocks_skipped());
    println!("Pages seen:         {}", stats.pages_seen);
    println!("Redirects skipped:  {}", stats.redirects_skipped);
    println!("Excluded skipped:   {}", stats.excluded_skipped);
    println!("Entries written:    {}", stats.entries);

    Ok(())
}

fn run_explore(args: ExploreArgs) -> Result<()> {
    let start_indexing = Instant::now();
    let titles = cache::load_or_build(&args.text_index, !args.no_cache)?;
    let indexing_duration = start_indexing.elapsed();
    info!(
        titles = titles.len(),
        duration_secs = indexing_duration.as_secs_f64(),
        "Title index ready"
    );

    let reader = MultistreamReader::open(&args.input, IndexSource::text(&args.text_index));
    let explorer = Explorer::new(&reader, &titles);

    let start_exploring = Instant::now();
    let pb = spinner();
    let mut on_progress = |event: &Progress| {
        if let Progress::TitleVisited {
            title,
            depth,
            outcome,
            accepted_total,
        } = event
        {
            if *outcome == VisitOutcome::Accepted {
                pb.set_message(format!(
                    "{} accepted, depth {}: {}",
                    accepted_total, depth, title
                ));
            }
        }
    };

    let stats = explorer
        .explore(
            &args.seed,
            args.depth,
            args.max_entries,
            &args.output,
            &mut on_progress,
        )
        .with_context(|| format!("Exploration from '{}' failed", args.seed))?;
    pb.finish_and_clear();

    println!();
    println!("=== Summary ===");
    println!("Title index time:   {:.2}s", indexing_duration.as_secs_f64());
    println!(
        "Exploration time:   {:.2}s",
        start_exploring.elapsed().as_secs_f64()
    );
    println!();
    println!("Titles accepted:    {}", stats.accepted);
    println!("Redirects followed: {}", stats.redirects_followed);
    println!("Not found:          {}", stats.not_found);
    println!("Deepest level:      {}", stats.max_depth_reached);
    println!("Entries written:    {}", stats.entries);

    Ok(())
}

fn run_list(args: ListArgs) -> Result<()> {
    let range = &args.range;
    let listing = range.source()?.list(range.start, range.count)?;

    let stdout = io::stdout();
    let mut csv = csv::Writer::from_writer(stdout.lock());
    match listing {
        Listing::Binary(entries) => {
            csv.write_record(["block_offset", "position_in_block", "record_id"])?;
            for e in entries {
                csv.write_record([
                    e.block_offset.to_string(),
                    e.position_in_block.to_string(),
                    e.record_id.to_string(),
                ])?;
            }
        }
        Listing::Text(rows) => {
            csv.write_record(["block_offset", "record_id", "title"])?;
            for row in rows {
                csv.write_record([
                    row.block_offset.to_string(),
                    row.record_id.to_string(),
                    row.title,
                ])?;
            }
        }
    }
    csv.flush()?;
    Ok(())
}

fn print_articles<R: Renderer>(
    reader: &MultistreamReader<Bz2Archive, R>,
    start: u64,
    count: usize,
) -> Result<()> {
    let articles = reader.fetch_records(start, count)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for article in &articles {
        serde_json::to_writer(&mut out, article)?;
        writeln!(out)?;
    }
    out.flush()?;
    info!(requested = count, printed = articles.len(), "Records printed");
    Ok(())
}

fn run_show(args: ShowArgs) -> Result<()> {
    let range = &args.range;
    let archive = Bz2Archive::new(&args.input);
    let source = range.source()?;
    if args.raw {
        let reader = MultistreamReader::with_parts(archive, source, RawRenderer);
        print_articles(&reader, range.start, range.count)
    } else {
        let reader = MultistreamReader::with_parts(archive, source, PlainTextRenderer);
        print_articles(&reader, range.start, range.count)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_writer(io::stderr);
    let installed = match EnvFilter::try_from_default_env() {
        Ok(filter) => {
            tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish())
        }
        Err(_) => tracing::subscriber::set_global_default(builder.with_max_level(level).finish()),
    };
    if let Err(e) = installed {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let result = match cli.command {
        Commands::Rebuild(args) => run_rebuild(args),
        Commands::Explore(args) => run_explore(args),
        Commands::List(args) => run_list(args),
        Commands::Show(args) => run_show(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
