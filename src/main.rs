mod accounts;
mod analyzer;
mod cache;
mod charts;
mod counsel;
mod export;
mod loader;
mod logging;
mod models;

use accounts::{Session, UserStore};
use analyzer::{EligibilityAnalyzer, FindOutcome, QueryIssue};
use anyhow::{Context, Result};
use cache::{TableCache, TableSnapshot};
use clap::{Arg, ArgAction, ArgMatches, Command};
use counsel::{CounselError, CounselNote, GeminiGenerator};
use loader::CutoffLoader;
use models::{Category, Config, DataSourceMode, EligibilityQuery, EligibleEntry, NearMiss};
use std::fs;
use std::path::Path;
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

fn parse_score(raw: &str) -> Result<f64, String> {
    let score: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", raw))?;
    if !score.is_finite() || score < 0.0 {
        return Err("score must be a non-negative number".to_string());
    }
    Ok(score)
}

fn parse_category(raw: &str) -> Result<Category, String> {
    raw.parse()
}

fn login_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("username")
            .long("username")
            .short('u')
            .value_name("NAME")
            .help("Account name (required when require_login is set)"),
    )
    .arg(
        Arg::new("password")
            .long("password")
            .short('p')
            .value_name("PASSWORD")
            .help("Account password (required when require_login is set)"),
    )
}

fn query_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("program")
            .long("program")
            .value_name("NAME")
            .required(true)
            .help("Program name, matched case-insensitively"),
    )
    .arg(
        Arg::new("category")
            .long("category")
            .value_name("CODE")
            .required(true)
            .value_parser(parse_category)
            .help("Category: UR, OBC, SC, ST, EWS or PwBD"),
    )
}

fn build_cli() -> Command {
    Command::new("college-preference")
        .version("0.1.0")
        .about("Finds the colleges you qualify for from admission cutoff tables")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable debug logging on stderr")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log filter, e.g. info or college_preference=trace")
                .global(true),
        )
        .subcommand(login_args(
            Command::new("programs").about("List programs in the cutoff table"),
        ))
        .subcommand(login_args(query_args(
            Command::new("find")
                .about("Generate a preference list for a score")
                .arg(
                    Arg::new("score")
                        .long("score")
                        .value_name("SCORE")
                        .required(true)
                        .value_parser(parse_score)
                        .help("Entrance test score"),
                )
                .arg(
                    Arg::new("girls-only")
                        .long("girls-only")
                        .action(ArgAction::SetTrue)
                        .help("Only show girls' colleges"),
                )
                .arg(
                    Arg::new("export")
                        .long("export")
                        .action(ArgAction::SetTrue)
                        .help("Write the preference list to the output directory as CSV"),
                )
                .arg(
                    Arg::new("no-counsel")
                        .long("no-counsel")
                        .action(ArgAction::SetTrue)
                        .help("Skip the generated counseling note"),
                ),
        )))
        .subcommand(login_args(query_args(
            Command::new("analytics").about("Show accessible colleges and average cutoffs"),
        )))
        .subcommand(login_args(
            Command::new("upload")
                .about("Replace the cutoff table with a new CSV file")
                .arg(Arg::new("file").value_name("FILE").required(true)),
        ))
        .subcommand(
            Command::new("signup")
                .about("Create an account")
                .arg(Arg::new("username").long("username").short('u').required(true))
                .arg(Arg::new("password").long("password").short('p').required(true))
                .arg(
                    Arg::new("confirm")
                        .long("confirm")
                        .help("Password confirmation (defaults to --password)"),
                ),
        )
        .subcommand(
            Command::new("login")
                .about("Check account credentials")
                .arg(Arg::new("username").long("username").short('u').required(true))
                .arg(Arg::new("password").long("password").short('p').required(true)),
        )
        .subcommand(login_args(
            Command::new("suggest")
                .about("Ask for free-form preference suggestions")
                .arg(
                    Arg::new("goal")
                        .long("goal")
                        .value_name("TEXT")
                        .required(true)
                        .help("Describe your score and goals"),
                )
                .arg(
                    Arg::new("reference")
                        .long("reference")
                        .value_name("FILE")
                        .help("CSV whose first rows are sent along as reference"),
                )
                .arg(
                    Arg::new("model")
                        .long("model")
                        .value_name("MODEL")
                        .help("Override the configured model"),
                ),
        ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    logging::init_tracing(
        matches.get_flag("verbose"),
        matches.get_one::<String>("log-level").map(String::as_str),
    )?;

    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");
    let config = load_or_create_config(config_file)?;

    let users = UserStore::new(&config.users_file);
    let mut cache = TableCache::new(&config.cutoff_file);

    match matches.subcommand() {
        Some(("programs", sub)) => {
            let session = open_session(&config, &users, sub)?;
            run_programs(&config, &mut cache, session.as_ref()).await
        }
        Some(("find", sub)) => {
            let session = open_session(&config, &users, sub)?;
            run_find(&config, &mut cache, sub, session.as_ref()).await
        }
        Some(("analytics", sub)) => {
            let session = open_session(&config, &users, sub)?;
            run_analytics(&config, &mut cache, sub, session.as_ref()).await
        }
        Some(("upload", sub)) => {
            let session = open_session(&config, &users, sub)?;
            run_upload(&mut cache, sub, session.as_ref())
        }
        Some(("signup", sub)) => run_signup(&users, sub),
        Some(("login", sub)) => run_login(&users, sub),
        Some(("suggest", sub)) => {
            let session = open_session(&config, &users, sub)?;
            run_suggest(&config, sub, session.as_ref()).await
        }
        _ => Ok(()),
    }
}

fn load_or_create_config(config_file: &str) -> Result<Config> {
    if Path::new(config_file).exists() {
        tracing::debug!(path = config_file, "loading configuration");
        Config::load_from_file(config_file)
            .with_context(|| format!("Failed to load configuration: {}", config_file))
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        let default_config = Config::default();
        default_config.save_to_file(config_file)?;
        Ok(default_config)
    }
}

/// Build the session for handlers when login is required.
fn open_session(config: &Config, users: &UserStore, sub: &ArgMatches) -> Result<Option<Session>> {
    if !config.require_login {
        return Ok(None);
    }

    let username = sub.get_one::<String>("username");
    let password = sub.get_one::<String>("password");
    let (Some(username), Some(password)) = (username, password) else {
        anyhow::bail!("login required: pass --username and --password (or sign up first)");
    };

    let session = users.verify(username, password)?;
    println!("👤 Signed in: {}", session.username);
    Ok(Some(session))
}

async fn load_table(config: &Config, cache: &mut TableCache) -> Result<TableSnapshot> {
    let snapshot = match (config.data_source_mode, config.cutoff_url.as_deref()) {
        (DataSourceMode::Internet, Some(url)) => {
            println!("🌐 Fetching cutoff table from: {}", url);
            let loaded = CutoffLoader::new().load_url(url, FETCH_TIMEOUT).await?;
            cache.store(loaded)
        }
        (DataSourceMode::Internet, None) => {
            println!("⚠️  data_source_mode is \"internet\" but cutoff_url is not set, using local file");
            cache.get()?
        }
        (DataSourceMode::Local, _) => cache.get()?,
    };

    for warning in &snapshot.warnings {
        println!("⚠️  {}", warning);
    }
    Ok(snapshot)
}

fn print_issue(issue: QueryIssue, cutoff_file: &Path) {
    match issue {
        QueryIssue::DataUnavailable => println!(
            "⚠️  Cutoff dataset ({}) not found or empty. Use the 'upload' command to add one.",
            cutoff_file.display()
        ),
        QueryIssue::CategoryUnavailable(category) => {
            println!("❌ Cutoff category '{}' not available for this program.", category)
        }
        QueryIssue::ProgramNotFound => {
            println!("⚠️  No data found for selected program.")
        }
    }
}

async fn run_programs(config: &Config, cache: &mut TableCache, session: Option<&Session>) -> Result<()> {
    let snapshot = load_table(config, cache).await?;
    if snapshot.table.is_empty() {
        print_issue(QueryIssue::DataUnavailable, cache.path());
        return Ok(());
    }

    tracing::debug!(user = session.map(|s| s.username.as_str()), "listing programs");
    println!("📚 Programs:");
    for (i, program) in loader::programs(&snapshot.table).iter().enumerate() {
        println!("   {}. {}", i + 1, program);
    }
    Ok(())
}

async fn run_find(
    config: &Config,
    cache: &mut TableCache,
    sub: &ArgMatches,
    session: Option<&Session>,
) -> Result<()> {
    let query = EligibilityQuery {
        program: sub.get_one::<String>("program").cloned().unwrap_or_default(),
        category: sub.get_one::<Category>("category").copied().unwrap_or(Category::UR),
        score: sub.get_one::<f64>("score").copied().unwrap_or(0.0),
        girls_only: sub.get_flag("girls-only"),
    };

    tracing::debug!(user = session.map(|s| s.username.as_str()), ?query, "running query");
    println!(
        "🔍 Analyzing cutoffs for {} ({}) with score {}",
        query.program, query.category, query.score
    );

    let snapshot = load_table(config, cache).await?;
    let analyzer = EligibilityAnalyzer::new();

    let (entries, summary) = match analyzer.find(&snapshot.table, &query, config.nearest_limit) {
        Err(issue) => {
            print_issue(issue, cache.path());
            return Ok(());
        }
        Ok(FindOutcome::NoEligibleMatch { nearest }) => {
            println!("⚠️  You did not meet the cutoff for this program in any college.");
            print_near_misses("🔎 Nearest cutoffs (for reference)", &nearest);
            return Ok(());
        }
        Ok(FindOutcome::Eligible { entries, summary }) => (entries, summary),
    };

    println!(
        "\n🎯 Eligible Colleges for {} ({}){}",
        query.program,
        query.category,
        if query.girls_only { " - Girls' Colleges only" } else { "" }
    );
    println!("   🏫 Eligible Colleges: {}", summary.eligible_colleges);
    println!("   📈 Highest Margin: {:.1} marks", summary.highest_margin);
    println!("   📉 Lowest Margin: {:.1} marks", summary.lowest_margin);
    print_entries(&entries);

    if sub.get_flag("export") {
        let output_dir = config.output_directory.as_deref().unwrap_or("output");
        let path = export::write_export(
            Path::new(output_dir),
            &entries,
            &query.program,
            query.category,
            query.girls_only,
        )?;
        println!("📥 Preference list saved to: {}", path.display());
    }

    if config.counsel.enabled && !sub.get_flag("no-counsel") {
        print_counsel_note(config, &entries, &query).await;
    }

    Ok(())
}

fn print_entries(entries: &[EligibleEntry]) {
    let width = entries.iter().map(|e| e.college.chars().count()).max().unwrap_or(0).max(12);
    println!(
        "\n   {:>4}  {:<width$}  {:>8}  {:>18}",
        "Rank",
        "College Name",
        "Cutoff",
        "Marks Above Cutoff",
        width = width
    );
    for entry in entries {
        println!(
            "   {:>4}  {:<width$}  {:>8.1}  {:>18.1}",
            entry.rank,
            entry.college,
            entry.cutoff,
            entry.margin,
            width = width
        );
    }
    println!("\n💡 'Marks Above Cutoff' shows how far your score exceeds the cutoff. Higher = safer choice!");
}

fn print_near_misses(title: &str, misses: &[NearMiss]) {
    println!("\n{}", title);
    if misses.is_empty() {
        println!("   (no cutoffs recorded for this category)");
        return;
    }
    for miss in misses {
        println!("   - {} ({}): {:.1}", miss.college, miss.program, miss.cutoff);
    }
}

async fn print_counsel_note(config: &Config, entries: &[EligibleEntry], query: &EligibilityQuery) {
    let generator = match GeminiGenerator::from_config(&config.counsel) {
        Ok(generator) => generator,
        Err(e) => {
            println!("\nℹ️  Counseling note skipped: {}", e);
            return;
        }
    };

    println!("\n🤖 Generating a short counseling note...");
    let prompt = counsel::counsel_prompt(
        entries,
        &query.program,
        query.category,
        query.score,
        config.counsel.max_colleges,
    );

    match counsel::request_note(&generator, &prompt).await {
        CounselNote::Generated(text) => println!("{}", text),
        CounselNote::Unavailable(e) => println!("⚠️  Could not generate counseling note: {}", e),
    }
}

async fn run_analytics(
    config: &Config,
    cache: &mut TableCache,
    sub: &ArgMatches,
    session: Option<&Session>,
) -> Result<()> {
    let program = sub.get_one::<String>("program").cloned().unwrap_or_default();
    let category = sub.get_one::<Category>("category").copied().unwrap_or(Category::UR);
    tracing::debug!(user = session.map(|s| s.username.as_str()), %program, %category, "analytics");

    let snapshot = load_table(config, cache).await?;
    let table = &snapshot.table;
    if table.is_empty() {
        print_issue(QueryIssue::DataUnavailable, cache.path());
        return Ok(());
    }
    if !table.has_category(category) {
        print_issue(QueryIssue::CategoryUnavailable(category), cache.path());
        return Ok(());
    }

    let top = analyzer::top_n_accessible(table, &program, category, config.top_n);
    if top.is_empty() {
        println!("⚠️  No data available for this program/category.");
        return Ok(());
    }

    let top_rows: Vec<(String, f64)> = top.into_iter().map(|m| (m.college, m.cutoff)).collect();
    println!(
        "\n{}",
        charts::render_bar_chart(
            &format!(
                "📊 Top {} Colleges by {} cutoff for {} (lower is more accessible)",
                config.top_n, category, program
            ),
            &top_rows,
            40,
        )
    );

    let averages: Vec<(String, f64)> = analyzer::average_by_college(table, category)
        .into_iter()
        .take(config.top_n)
        .collect();
    println!(
        "{}",
        charts::render_bar_chart(
            &format!("📊 College-wise Average {} Cutoff", category),
            &averages,
            40
        )
    );
    Ok(())
}

fn run_upload(cache: &mut TableCache, sub: &ArgMatches, session: Option<&Session>) -> Result<()> {
    let source = sub.get_one::<String>("file").map(String::as_str).unwrap_or_default();
    tracing::debug!(user = session.map(|s| s.username.as_str()), source, "uploading cutoff table");

    let file = fs::File::open(source).with_context(|| format!("Failed to upload file: {}", source))?;
    let normalized = loader::normalize_csv(file).with_context(|| format!("Failed to upload file: {}", source))?;
    let version = cache.replace(&normalized)?;

    let snapshot = cache.get()?;
    for warning in &snapshot.warnings {
        println!("⚠️  {}", warning);
    }
    println!(
        "✅ {} uploaded and saved as {} ({} rows, version {}).",
        source,
        cache.path().display(),
        snapshot.table.records.len(),
        version
    );
    Ok(())
}

fn run_signup(users: &UserStore, sub: &ArgMatches) -> Result<()> {
    let username = sub.get_one::<String>("username").map(String::as_str).unwrap_or_default();
    let password = sub.get_one::<String>("password").map(String::as_str).unwrap_or_default();
    let confirm = sub.get_one::<String>("confirm").map(String::as_str).unwrap_or(password);

    users.signup(username, password, confirm)?;
    println!("✅ Account created in {}! Please log in.", users.path().display());
    Ok(())
}

fn run_login(users: &UserStore, sub: &ArgMatches) -> Result<()> {
    let username = sub.get_one::<String>("username").map(String::as_str).unwrap_or_default();
    let password = sub.get_one::<String>("password").map(String::as_str).unwrap_or_default();

    let session = users.verify(username, password)?;
    println!("✅ Welcome, {} 👋", session.username);
    Ok(())
}

async fn run_suggest(config: &Config, sub: &ArgMatches, session: Option<&Session>) -> Result<()> {
    let goal = sub.get_one::<String>("goal").map(String::as_str).unwrap_or_default();
    if goal.trim().is_empty() {
        println!("⚠️  Please describe your goals before generating suggestions.");
        return Ok(());
    }

    let reference = match sub.get_one::<String>("reference") {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read reference file: {}", path))?;
            println!("✅ Reference file loaded: {}", path);
            Some(counsel::reference_excerpt(&text))
        }
        None => None,
    };

    let mut counsel_config = config.counsel.clone();
    if let Some(model) = sub.get_one::<String>("model") {
        counsel_config.model = model.clone();
    }

    let generator = match GeminiGenerator::from_config(&counsel_config) {
        Ok(generator) => generator,
        Err(e @ CounselError::NotConfigured(_)) => {
            println!("❌ {}", e);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    tracing::debug!(user = session.map(|s| s.username.as_str()), model = %counsel_config.model, "suggest");
    println!("🤖 Generating suggestions...");
    let prompt = counsel::suggestion_prompt(goal, reference.as_deref());
    match counsel::request_note(&generator, &prompt).await {
        CounselNote::Generated(text) => println!("\n🧭 Suggestion\n{}", text),
        CounselNote::Unavailable(e) => println!("⚠️  AI generation failed: {}", e),
    }
    Ok(())
}
