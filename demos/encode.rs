use clap::Parser;
use color_eyre::eyre::bail;

use tv_ir::attrs::ParamAttrs;
use tv_ir::config::Config;
use tv_ir::smt::Smt;
use tv_ir::state::{Phase, State};
use tv_ir::types::TypeId;
use tv_ir::value::Program;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Type of the input: `iN`, `ptr`, or a comma-separated list of those for an aggregate.
    #[arg(value_name = "TYPE", default_value = "i8")]
    ty: String,

    /// Name of the input.
    #[clap(long, default_value = "%x")]
    name: String,

    #[clap(long)]
    noundef: bool,

    #[clap(long)]
    nonnull: bool,

    /// Mark the input `dereferenceable` for this many bytes.
    #[clap(long, value_name = "BYTES")]
    deref: Option<u64>,

    /// Pass the input `byval`, with a caller copy of this many bytes.
    #[clap(long, value_name = "BYTES")]
    byval: Option<u64>,

    #[clap(long, value_name = "INT", default_value = "1")]
    align: u64,

    /// Inputs are never undef.
    #[clap(long)]
    disable_undef: bool,

    /// Inputs are never poison.
    #[clap(long)]
    disable_poison: bool,

    #[clap(long, value_name = "INT", default_value = "8")]
    bits_for_bid: u32,

    #[clap(long, value_name = "INT", default_value = "32")]
    bits_for_offset: u32,

    /// Search for a model of the axioms (only for small encodings).
    #[clap(long)]
    check: bool,

    /// Log every rewrite and allocation.
    #[clap(long)]
    debug: bool,
}

fn parse_type(program: &mut Program, s: &str) -> color_eyre::Result<TypeId> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() > 1 {
        let mut elems = Vec::new();
        for p in parts {
            elems.push(parse_type(program, p)?);
        }
        return Ok(program.types_mut().mk_aggregate(elems));
    }
    let s = parts[0];
    if s == "ptr" {
        return Ok(program.types_mut().mk_ptr());
    }
    match s.strip_prefix('i').map(str::parse::<u32>) {
        Some(Ok(bits)) if bits > 0 => Ok(program.types_mut().mk_int(bits)),
        _ => bail!("Bad type '{}'", s),
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    simplelog::TermLogger::init(
        if args.debug {
            simplelog::LevelFilter::Debug
        } else {
            simplelog::LevelFilter::Info
        },
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    println!("args = {:?}", args);

    let config = Config {
        disable_undef_input: args.disable_undef,
        disable_poison_input: args.disable_poison,
        bits_for_bid: args.bits_for_bid,
        bits_for_offset: args.bits_for_offset,
        ..Config::default()
    };

    if !args.align.is_power_of_two() {
        bail!("Alignment {} is not a power of two", args.align);
    }
    let mut attrs = ParamAttrs::new().aligned(args.align);
    if args.noundef {
        attrs = attrs.noundef();
    }
    if args.nonnull {
        attrs = attrs.nonnull();
    }
    if let Some(bytes) = args.deref {
        attrs = attrs.dereferenceable(bytes);
    }
    if let Some(bytes) = args.byval {
        attrs = attrs.byval(bytes);
    }

    let mut program = Program::new();
    let ty = parse_type(&mut program, &args.ty)?;
    let x = program.add_input(ty, args.name.as_str(), attrs);
    println!("input: {}", program.display(x));

    let smt = Smt::new();
    let mut s = State::new(&smt, &program, &config, Phase::Source);
    let sv = program.value(x).to_smt(&mut s);

    println!("value      = {}", smt.to_smtlib(sv.value));
    println!("non_poison = {}", smt.to_smtlib(sv.non_poison));
    for v in s.undef_vars() {
        println!("undef var  : {}", smt.to_smtlib(*v));
    }
    for (bid, block) in s.memory().blocks() {
        println!("block {}   : {:?}", bid, block);
    }

    println!();
    print!("{}", smt.to_smtlib_script(s.axiom_list()));

    if args.check {
        match smt.find_model(s.axioms())? {
            Some(model) => println!("; model: {}", model),
            None => println!("; axioms are unsatisfiable"),
        }
    }

    Ok(())
}
