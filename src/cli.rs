use crate::error::{SwitchError, SwitchResult};

const USAGE_SUMMARY: &str =
    "usage: claude-switch <add|import|use|list|remove|exec|help> [args] (see 'claude-switch help')";

#[derive(Debug, PartialEq, Eq)]
pub enum CliCommand {
    Help,
    Add { name: String, label: Option<String> },
    Import { name: String, label: Option<String> },
    Use(String),
    List,
    Remove(String),
    Exec { name: String, command: Vec<String> },
}

impl CliCommand {
    pub fn parse(args: &[String]) -> SwitchResult<Self> {
        let Some(first) = args.first() else {
            return Err(usage(USAGE_SUMMARY));
        };

        match first.as_str() {
            "-h" | "--help" | "help" => Ok(Self::Help),
            "add" => {
                let (name, label) =
                    parse_name_and_label(&args[1..], "usage: claude-switch add <name> [--label <text>]")?;
                Ok(Self::Add { name, label })
            }
            "import" => {
                let (name, label) = parse_name_and_label(
                    &args[1..],
                    "usage: claude-switch import <name> [--label <text>]",
                )?;
                Ok(Self::Import { name, label })
            }
            "use" => {
                if args.len() != 2 {
                    return Err(usage("usage: claude-switch use <name>"));
                }
                Ok(Self::Use(args[1].clone()))
            }
            "list" | "ls" => {
                if args.len() != 1 {
                    return Err(usage("usage: claude-switch list"));
                }
                Ok(Self::List)
            }
            "remove" | "rm" => {
                if args.len() != 2 {
                    return Err(usage("usage: claude-switch remove <name>"));
                }
                Ok(Self::Remove(args[1].clone()))
            }
            "exec" => {
                let exec_usage = "usage: claude-switch exec <name> [--] <command...>";
                let Some(name) = args.get(1) else {
                    return Err(usage(exec_usage));
                };
                let mut command = &args[2..];
                if command.first().map(String::as_str) == Some("--") {
                    command = &command[1..];
                }
                if command.is_empty() {
                    return Err(usage(exec_usage));
                }
                Ok(Self::Exec {
                    name: name.clone(),
                    command: command.to_vec(),
                })
            }
            _ => Err(usage(&format!("unknown command: {}", first))),
        }
    }
}

fn usage(message: &str) -> SwitchError {
    SwitchError::Usage(message.to_string())
}

fn parse_name_and_label(args: &[String], usage_line: &str) -> SwitchResult<(String, Option<String>)> {
    let mut name = None;
    let mut label = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--label" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return Err(usage(usage_line));
                };
                label = Some(value.clone());
            }
            value if value.starts_with("--") => return Err(usage(usage_line)),
            value => {
                if name.is_some() {
                    return Err(usage(usage_line));
                }
                name = Some(value.to_string());
            }
        }
        i += 1;
    }

    let name = name.ok_or_else(|| usage(usage_line))?;
    Ok((name, label))
}
