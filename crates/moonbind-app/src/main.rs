use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context as _};
use clap::Parser as CliParser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use moonbind_lang::{
    analysis,
    syntax::lexer::Lexer,
    syntax::parser::Parser,
    Error, RuntimeConfig, RuntimeManager, TypeRegistry,
};

const DEMO_SCRIPT: &str = r#"-- bound as `node` before this runs
print("PointlessBool starts as", node.PointlessBool)
node:SayHello()
node:SetPointlessBool(true)
print("PointlessBool is now", node.PointlessBool)

for i = 1, 10 do print(node:Add(i, 5)) end

ElementNode.SaySomething("called without an instance")

local fresh = ElementNode.Create()
fresh.Name = "fresh"
fresh:SayHello()

local ok, err = pcall(function() return node.Missing end)
print(ok, err)
"#;

// ─── CLI ──────────────────────────────────────────────────────────────────────

#[derive(CliParser, Debug)]
#[command(name = "moonbind", about = "Run scripts against natively bound demo types")]
struct Cli {
    /// Script to run. Runs the built-in demo when omitted.
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Runtime configuration file (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Compile only and report diagnostics per stage.
    #[arg(long)]
    check: bool,
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ─── Demo type ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ElementNode {
    pointless_bool: bool,
    name: String,
}

fn element_node_registry() -> anyhow::Result<TypeRegistry<ElementNode>> {
    let mut reg = TypeRegistry::new("ElementNode");
    reg.register_field("PointlessBool", |n: &mut ElementNode| &mut n.pointless_bool)?;
    reg.register_field("Name", |n: &mut ElementNode| &mut n.name)?;
    reg.register_method("SayHello", |frame| {
        let name = frame.with_userdata(1, |n: &mut ElementNode| n.name.clone())?;
        let line = if name.is_empty() { "Hello!".to_string() } else { format!("Hello from {name}!") };
        frame.context().write_line(line);
        Ok(0)
    })?;
    reg.register_method("SetPointlessBool", |frame| {
        let value = frame.to_boolean(2);
        frame.with_userdata(1, |n: &mut ElementNode| n.pointless_bool = value)?;
        Ok(0)
    })?;
    reg.register_method("Add", |frame| {
        let a = frame.check_integer(2)?;
        let b = frame.check_integer(3)?;
        frame.push(a + b);
        Ok(1)
    })?;
    reg.register_free_function("SaySomething", |frame| {
        let text = frame.check_string(1)?;
        frame.context().write_line(format!("ElementNode says: {text}"));
        Ok(0)
    })?;
    Ok(reg)
}

// ─── Stages ───────────────────────────────────────────────────────────────────

fn report(stage: &str, errs: &[Error]) -> anyhow::Result<()> {
    for e in errs {
        eprintln!("[{stage}] {e}");
    }
    bail!("{} error(s) during {stage}", errs.len())
}

fn check(source: &str) -> anyhow::Result<()> {
    // ── Lex ───────────────────────────────────────────────────────────────────
    let tokens = match Lexer::new(source).tokenize() {
        Ok(t) => t,
        Err(errs) => return report("lex", &errs),
    };

    // ── Parse ─────────────────────────────────────────────────────────────────
    let chunk = match Parser::new(tokens).parse() {
        Ok(c) => c,
        Err(errs) => return report("parse", &errs),
    };

    // ── Validate ──────────────────────────────────────────────────────────────
    if let Err(errs) = analysis::validate(&chunk) {
        return report("validate", &errs);
    }

    println!("ok: {} top-level statement(s)", chunk.body.body.len());
    Ok(())
}

fn run(source: &str, config: RuntimeConfig) -> anyhow::Result<()> {
    let capture = config.capture_output;
    let mut rt = RuntimeManager::with_config(config);

    let element = element_node_registry()?;
    rt.apply_registry(&element)?;
    let node = rt.instantiate(&element)?;
    rt.set_global("node")?;

    let result = rt.execute(source);
    if capture {
        for line in rt.take_output() {
            println!("{line}");
        }
    }
    result.context("script failed")?;

    info!(
        pointless_bool = ?node.with(|n| n.pointless_bool),
        reclaimed = rt.collect_garbage(),
        "script finished"
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = match &cli.config {
        Some(path) => RuntimeConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    let source = match &cli.script {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?,
        None => DEMO_SCRIPT.to_string(),
    };

    if cli.check {
        return check(&source);
    }
    run(&source, config)
}
