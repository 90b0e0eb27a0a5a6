use std::{env, process};

use rex::{CompileMode, Regex};

struct Args {
    pattern: String,
    subject: String,
    mode: CompileMode,
    dump: bool,
}

fn main() {
    env_logger::init();
    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{}", msg);
            process::exit(2);
        }
    };
    let regex = match Regex::with_mode(args.pattern.as_bytes(), args.mode) {
        Ok(regex) => regex,
        Err(err) => {
            eprintln!("bad pattern {:?}: {}", args.pattern, err);
            process::exit(2);
        }
    };
    if args.dump {
        eprint!("{:?}", regex.program());
    }

    let subject = args.subject.as_bytes();
    match regex.captures(subject) {
        Some(caps) => {
            for (i, group) in caps.iter().enumerate() {
                match group {
                    Some((b, e)) => println!(
                        "{} {}..{} \"{}\"",
                        if i == 0 { "MATCH".to_string() } else { format!("GROUP {}", i) },
                        b,
                        e,
                        subject[b..e].escape_ascii()
                    ),
                    None => println!("GROUP {} unset", i),
                }
            }
        }
        None => {
            println!("NO MATCH");
            process::exit(1);
        }
    }
}

fn parse_args() -> Result<Args, String> {
    let mut mode = CompileMode::CAPTURE;
    let mut dump = false;
    let mut rest = vec![];
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "-i" => mode |= CompileMode::IGNORE_CASE,
            "-n" => mode |= CompileMode::NEWLINE,
            "-v" => mode |= CompileMode::VERBATIM,
            "-d" => dump = true,
            _ => rest.push(arg),
        }
    }
    let mut rest = rest.into_iter();
    match (rest.next(), rest.next(), rest.next()) {
        (Some(pattern), Some(subject), None) => Ok(Args {
            pattern,
            subject,
            mode,
            dump,
        }),
        _ => Err(String::from(
            "usage: rex_engine [-i] [-n] [-v] [-d] <pattern> <subject>",
        )),
    }
}
