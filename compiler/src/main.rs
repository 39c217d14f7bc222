//! `compiler`: source text -> frontend -> emitter -> image (§6.3).

use clap::{value_t, App, Arg};
use frontend::FrontendError;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tvm::ast::Node;
use tvm::emitter::{EmitError, Emitter};
use tvm::hostcall::HostTable;
use tvm::section::{CodecError, Image, Section};
use tvm::symbol::{Section as SymSection, Symbol};
use tvm::value::Value;

const SUPPORTED_LANG: &str = "simple-math";
const SUPPORTED_TARGET: &str = "tvm";

#[derive(Debug)]
enum Error {
    Io(io::Error, &'static str, PathBuf),
    Frontend(FrontendError),
    Emit(EmitError),
    Codec(CodecError),
    UnsupportedLang(String),
    UnsupportedTarget(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(e, action, path) => write!(f, "{} \"{}\": {}", action, path.display(), e),
            Error::Frontend(e) => write!(f, "parse error: {}", e),
            Error::Emit(e) => write!(f, "emit error: {}", e),
            Error::Codec(e) => write!(f, "image codec error: {}", e),
            Error::UnsupportedLang(l) => write!(f, "unsupported -lang {:?} (only {:?})", l, SUPPORTED_LANG),
            Error::UnsupportedTarget(t) => {
                write!(f, "unsupported -target {:?} (only {:?})", t, SUPPORTED_TARGET)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<FrontendError> for Error {
    fn from(e: FrontendError) -> Self {
        Error::Frontend(e)
    }
}

impl From<EmitError> for Error {
    fn from(e: EmitError) -> Self {
        Error::Emit(e)
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::Codec(e)
    }
}

/// Identity pass: the reference "optimizer" is a pass-through (§9, §6.3).
fn optimize(root: Node) -> Node {
    log::info!("running identity optimizer pass");
    root
}

fn read_source(path: &str) -> Result<String, Error> {
    let mut buf = String::new();
    File::open(path)
        .map_err(|e| Error::Io(e, "reading input", PathBuf::from(path)))?
        .read_to_string(&mut buf)
        .map_err(|e| Error::Io(e, "reading input", PathBuf::from(path)))?;
    Ok(buf)
}

fn write_output(out_path: &str, bytes: &[u8]) -> Result<(), Error> {
    if out_path == "-" {
        io::stdout()
            .write_all(bytes)
            .map_err(|e| Error::Io(e, "writing output", PathBuf::from(out_path)))
    } else {
        File::create(out_path)
            .and_then(|mut f| f.write_all(bytes))
            .map_err(|e| Error::Io(e, "writing output", PathBuf::from(out_path)))
    }
}

fn dump_ast(root: &Node) -> String {
    fn walk(node: &Node, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        match node {
            Node::Identifier(name, _) => out.push_str(&format!("{}IDENT {}\n", indent, name)),
            Node::Integer(n, _) => out.push_str(&format!("{}INT {}\n", indent, n)),
            Node::Number(r, _) => out.push_str(&format!("{}NUM {}\n", indent, r)),
            Node::Op(op, children, _) => {
                out.push_str(&format!("{}{:?}\n", indent, op));
                for child in children {
                    walk(child, depth + 1, out);
                }
            }
        }
    }
    let mut out = String::new();
    walk(root, 0, &mut out);
    out
}

fn build_image(emitted: tvm::emitter::Emitted) -> Result<Vec<u8>, Error> {
    let mut image = Image::new();
    image.add_section(&Section::new_code(emitted.code)?, true)?;
    if !emitted.consts.is_empty() {
        image.add_section(&Section::new_consts(emitted.consts)?, true)?;
    }
    if !emitted.vars.is_empty() {
        image.add_section(&Section::new_variables(emitted.vars)?, true)?;
    }

    let mut os_id = tvm::constants::SYM_RESERVED;
    let os_symbols: Vec<Symbol> = HostTable::default_table()
        .names()
        .map(|name| {
            let sym = Symbol::new(os_id, (*name).to_string(), SymSection::Os, Value::Label(0), 1);
            os_id += 1;
            sym
        })
        .collect();
    image.add_section(&Section::new_os(os_symbols)?, true)?;

    Ok(image.into_bytes())
}

fn run(input: &str, output: Option<&str>, ast: bool, opt: bool) -> Result<(), Error> {
    let source = read_source(input)?;
    let mut tree = frontend::parse(&source)?;
    if opt {
        tree = optimize(tree);
    }

    if ast {
        let out_path = output.unwrap_or("-");
        return write_output(out_path, dump_ast(&tree).as_bytes());
    }

    let emitted = Emitter::new().emit(&tree)?;
    let bytes = build_image(emitted)?;

    let default_output;
    let out_path = match output {
        Some(o) => o,
        None => {
            default_output = PathBuf::from(input).with_extension("tvm");
            default_output.to_str().expect("input path is valid utf-8")
        }
    };
    write_output(out_path, &bytes)
}

fn main() {
    env_logger::init();

    let matches = App::new("compiler")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Compiles simple-math source into a Toy VM image")
        .arg(
            Arg::with_name("input")
                .short("i")
                .long("input")
                .takes_value(true)
                .required(true)
                .value_name("SRC")
                .help("Source file to compile"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("OUT")
                .help("Output file; \"-\" means stdout"),
        )
        .arg(
            Arg::with_name("ast")
                .long("ast")
                .help("Dump pseudo-assembly instead of emitting a binary image"),
        )
        .arg(
            Arg::with_name("optimize")
                .short("O")
                .help("Run the optimizer pass (identity clone)"),
        )
        .arg(
            Arg::with_name("lang")
                .long("lang")
                .takes_value(true)
                .default_value(SUPPORTED_LANG)
                .help("Source language (reserved switch; only \"simple-math\" is supported)"),
        )
        .arg(
            Arg::with_name("target")
                .long("target")
                .takes_value(true)
                .default_value(SUPPORTED_TARGET)
                .help("Target backend (reserved switch; only \"tvm\" is supported)"),
        )
        .get_matches();

    let lang = value_t!(matches, "lang", String).unwrap_or_else(|e| e.exit());
    let target = value_t!(matches, "target", String).unwrap_or_else(|e| e.exit());

    let result = (|| -> Result<(), Error> {
        if lang != SUPPORTED_LANG {
            return Err(Error::UnsupportedLang(lang));
        }
        if target != SUPPORTED_TARGET {
            return Err(Error::UnsupportedTarget(target));
        }
        run(
            matches.value_of("input").expect("-i is required"),
            matches.value_of("output"),
            matches.is_present("ast"),
            matches.is_present("optimize"),
        )
    })();

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
