mod classpath;
mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pointcut_classfile::opcodes::from_mnemonic;
use pointcut_classfile::{ClassNode, InsnId, MethodNode};
use pointcut_config::{init_tracing, load_for_root, PointcutConfig};
use pointcut_core::CancellationToken;
use pointcut_resolve::{
    AtResolver, AtSpec, ClassIndex, LocalDiscriminator, Mode, ResolveError, Shift, TargetMethod,
};

use crate::classpath::ClasspathIndex;
use crate::report::{
    print_output, ClassDump, Completions, FrameRows, LocalRows, Resolution, Validation,
};

#[derive(Parser)]
#[command(
    name = "pointcut",
    version,
    about = "Resolve @At injection points against compiled classes"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the instruction list of a class or one of its methods
    Dump(DumpArgs),
    /// Print the inferred frame before every instruction of a method
    Frames(MethodArgs),
    /// Print the local variables live at each instruction of a method
    Locals(LocalsArgs),
    /// Resolve an injection point and print the instructions it selects
    Resolve(ResolveArgs),
    /// Report whether an injection point resolves
    Check(AtCommandArgs),
    /// List the targets an injection point could select
    Complete(AtCommandArgs),
}

#[derive(Args)]
struct ClassArgs {
    /// Compiled `.class` file to inspect
    class: PathBuf,
    /// Directory searched for referenced classes; may be repeated
    #[arg(long, value_name = "DIR")]
    classpath: Vec<PathBuf>,
    /// Config file (defaults to `pointcut.toml` in the current directory)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Emit JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct DumpArgs {
    #[command(flatten)]
    class: ClassArgs,
    /// Only this method: `name` or `name(desc)`
    #[arg(long)]
    method: Option<String>,
}

#[derive(Args)]
struct MethodArgs {
    #[command(flatten)]
    class: ClassArgs,
    /// Method to inspect: `name` or `name(desc)`
    #[arg(long)]
    method: String,
}

#[derive(Args)]
struct LocalsArgs {
    #[command(flatten)]
    method: MethodArgs,
    /// Only this instruction index
    #[arg(long = "insn", value_name = "INDEX")]
    insn: Option<usize>,
}

#[derive(Args)]
struct AtArgs {
    /// Injection point code (`HEAD`, `INVOKE`, `FIELD`, ...)
    #[arg(long = "at", value_name = "CODE", required_unless_present = "spec")]
    value: Option<String>,
    /// Target selector
    #[arg(long)]
    target: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    ordinal: Option<i32>,
    /// Opcode restriction, by mnemonic (`GETFIELD`) or number
    #[arg(long)]
    opcode: Option<String>,
    /// `before`, `after` or a signed node distance
    #[arg(long, allow_hyphen_values = true)]
    shift: Option<String>,
    /// `key=value` argument; may be repeated
    #[arg(long = "arg", value_name = "KEY=VALUE")]
    args: Vec<String>,
    /// Name of the local variable for `LOAD` and `STORE`
    #[arg(long)]
    local: Option<String>,
    /// Full `@At` as JSON; the other options override its fields
    #[arg(long, value_name = "JSON")]
    spec: Option<String>,
}

#[derive(Args)]
struct AtCommandArgs {
    #[command(flatten)]
    method: MethodArgs,
    #[command(flatten)]
    at: AtArgs,
}

#[derive(Args)]
struct ResolveArgs {
    #[command(flatten)]
    inner: AtCommandArgs,
    /// Stop at the first match
    #[arg(long)]
    first: bool,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Dump(args) => {
            let session = Session::open(&args.class)?;
            let methods: Vec<&MethodNode> = match &args.method {
                Some(method) => vec![session.method(method)?.method],
                None => session.class.methods.iter().map(Arc::as_ref).collect(),
            };
            print_output(&ClassDump::new(&session.class, &methods), args.class.json)?;
            Ok(0)
        }
        Command::Frames(args) => {
            let session = Session::open(&args.class)?;
            let target = session.method(&args.method)?;
            let analysis = session.resolver.analysis(target, &session.cancel)?;
            let Some(frames) = &analysis.frames else {
                bail!("no frames could be computed for {target}");
            };
            print_output(&FrameRows::new(target.method, frames), args.class.json)?;
            Ok(0)
        }
        Command::Locals(args) => {
            let session = Session::open(&args.method.class)?;
            let target = session.method(&args.method.method)?;
            let insns = &target.method.instructions;
            let positions: Vec<InsnId> = match args.insn {
                Some(index) => {
                    let id = InsnId::new(index);
                    insns
                        .get(id)
                        .with_context(|| format!("no instruction {index} in {target}"))?;
                    vec![id]
                }
                None => insns
                    .iter()
                    .filter(|(_, insn)| insn.is_real())
                    .map(|(id, _)| id)
                    .collect(),
            };
            let mut rows = LocalRows::default();
            for at in positions {
                let table = session.resolver.locals_at(target, at, &session.cancel)?;
                rows.push(target.method, at, &table);
            }
            print_output(&rows, args.method.class.json)?;
            Ok(0)
        }
        Command::Resolve(args) => {
            let session = Session::open(&args.inner.method.class)?;
            let target = session.method(&args.inner.method.method)?;
            let at = at_spec(&args.inner.at)?;
            let mode = if args.first { Mode::First } else { Mode::All };
            match session.resolver.resolve(&at, target, mode, &session.cancel) {
                Ok(results) => {
                    print_output(
                        &Resolution::new(target.method, &results),
                        args.inner.method.class.json,
                    )?;
                    Ok(0)
                }
                Err(ResolveError::NoMatch { blamed_filter }) => {
                    let reason = blamed_filter
                        .map(|filter| format!(" (rejected by {filter})"))
                        .unwrap_or_default();
                    eprintln!("@At(\"{}\") matched nothing in {target}{reason}", at.value);
                    print_output(&Resolution::empty(), args.inner.method.class.json)?;
                    Ok(1)
                }
                Err(err) => Err(err.into()),
            }
        }
        Command::Check(args) => {
            let session = Session::open(&args.method.class)?;
            let target = session.method(&args.method.method)?;
            let at = at_spec(&args.at)?;
            let diagnostic = session.resolver.check(&at, target, &session.cancel)?;
            let exit = if diagnostic.is_some() { 1 } else { 0 };
            print_output(&Validation::new(diagnostic), args.method.class.json)?;
            Ok(exit)
        }
        Command::Complete(args) => {
            let session = Session::open(&args.method.class)?;
            let target = session.method(&args.method.method)?;
            let at = at_spec(&args.at)?;
            let items = session
                .resolver
                .completion_variants(&at, target, &session.cancel)?;
            print_output(&Completions::new(items), args.method.class.json)?;
            Ok(0)
        }
    }
}

/// The class under inspection and a resolver over its classpath.
struct Session {
    class: Arc<ClassNode>,
    resolver: AtResolver,
    cancel: CancellationToken,
}

impl Session {
    fn open(args: &ClassArgs) -> Result<Self> {
        let config = load_config(args.config.as_deref())?;
        init_tracing(&config.logging);

        let bytes = std::fs::read(&args.class)
            .with_context(|| format!("failed to read {}", args.class.display()))?;
        let class = ClassNode::parse(&bytes)
            .with_context(|| format!("failed to parse {}", args.class.display()))?;

        let index = ClasspathIndex::new(args.classpath.clone());
        index.insert(&class.name, Arc::from(bytes));
        let index: Arc<dyn ClassIndex> = Arc::new(index);
        let resolver = AtResolver::new(index).with_options(config.resolver_options());

        Ok(Self {
            class: Arc::new(class),
            resolver,
            cancel: CancellationToken::new(),
        })
    }

    /// Looks up `name` or `name(desc)`.
    fn method(&self, spec: &str) -> Result<TargetMethod<'_>> {
        let (name, desc) = match spec.find('(') {
            Some(open) => (&spec[..open], Some(&spec[open..])),
            None => (spec, None),
        };
        TargetMethod::find(&self.class, name, desc)
            .ok_or_else(|| anyhow!("no method `{spec}` in {}", self.class.name))
    }
}

fn load_config(path: Option<&Path>) -> Result<PointcutConfig> {
    match path {
        Some(path) => PointcutConfig::load_from_path(path)
            .with_context(|| format!("invalid config {}", path.display())),
        None => {
            let cwd = std::env::current_dir().context("failed to read the current directory")?;
            let (config, _) = load_for_root(&cwd)?;
            Ok(config)
        }
    }
}

fn at_spec(args: &AtArgs) -> Result<AtSpec> {
    let mut at = match &args.spec {
        Some(json) => serde_json::from_str::<AtSpec>(json).context("invalid --spec")?,
        None => AtSpec::default(),
    };
    if let Some(value) = &args.value {
        at.value = value.clone();
    }
    if args.target.is_some() {
        at.target = args.target.clone();
    }
    if let Some(ordinal) = args.ordinal {
        at.ordinal = ordinal;
    }
    if let Some(opcode) = &args.opcode {
        at.opcode = i32::from(parse_opcode(opcode)?);
    }
    if let Some(shift) = &args.shift {
        at.shift = parse_shift(shift)?;
    }
    at.args.extend(args.args.iter().cloned());
    if let Some(name) = &args.local {
        at.local = Some(LocalDiscriminator::named(name));
    }
    if at.value.is_empty() {
        bail!("no injection point given; pass --at or --spec");
    }
    Ok(at)
}

fn parse_opcode(text: &str) -> Result<u8> {
    if let Ok(number) = text.parse::<u8>() {
        return Ok(number);
    }
    from_mnemonic(text).ok_or_else(|| anyhow!("unknown opcode `{text}`"))
}

fn parse_shift(text: &str) -> Result<Shift> {
    Ok(match text.to_ascii_lowercase().as_str() {
        "none" => Shift::None,
        "before" => Shift::Before,
        "after" => Shift::After,
        other => Shift::By(
            other
                .parse()
                .map_err(|_| anyhow!("invalid shift `{text}`"))?,
        ),
    })
}
