pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use self::args::{CliConfig, Command, DeclareArgs, KindFlags, LogFormat};

#[cfg(feature = "cli")]
mod args {
    use crate::core::engine::{DeclareMode, FieldUpdate};
    use crate::domain::model::ResourceKind;
    use clap::{Args, Parser, Subcommand, ValueEnum};

    #[derive(Debug, Clone, Parser)]
    #[command(name = "bqmod", version)]
    #[command(about = "Scaffold and validate BisQue module descriptors")]
    pub struct CliConfig {
        #[arg(long, short, global = true, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, global = true, default_value = "bqmod.toml")]
        pub settings: String,

        /// Module folder holding bqconfig.json
        #[arg(long, global = true, default_value = ".")]
        pub dir: String,

        /// Answer yes to every confirmation question
        #[arg(long, global = true)]
        pub assume_yes: bool,

        #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
        pub log_format: LogFormat,

        #[command(subcommand)]
        pub command: Command,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
    pub enum LogFormat {
        Compact,
        Json,
    }

    #[derive(Debug, Clone, Subcommand)]
    pub enum Command {
        /// Create an empty bqconfig.json
        Init {
            /// Overwrite an existing config without asking
            #[arg(long)]
            force: bool,
        },
        /// Set module metadata
        #[command(arg_required_else_help = true)]
        Set {
            #[arg(long, short = 'n', help = "Module name with no spaces, same as the module folder")]
            name: Option<String>,
            #[arg(long, short = 'a')]
            author: Option<String>,
            #[arg(long, short = 'd')]
            description: Option<String>,
        },
        /// Declare a module input
        Inputs(DeclareArgs),
        /// Declare a module output
        Outputs(DeclareArgs),
        /// Print the current configuration
        Summary,
        /// Compare declared names with the keys used in the module source
        Check {
            #[arg(long)]
            source: Option<String>,
        },
        /// Write <Name>.xml and the help page
        Create {
            #[arg(long)]
            source: Option<String>,
            /// Continue past key mismatches without asking
            #[arg(long, short = 'y')]
            yes: bool,
        },
        /// Download the module scaffold files
        Fetch {
            #[arg(long)]
            dest: Option<String>,
        },
    }

    #[derive(Debug, Clone, Args)]
    pub struct DeclareArgs {
        #[command(flatten)]
        pub kind: KindFlags,

        #[arg(long, short = 'n', help = "Name shown in BisQue, e.g. \"Input Image\"")]
        pub name: String,

        /// Replace an existing declaration without asking
        #[arg(long, short = 'y', conflicts_with = "keep")]
        pub yes: bool,

        /// Leave an existing declaration untouched
        #[arg(long)]
        pub keep: bool,
    }

    #[derive(Debug, Clone, Args)]
    #[group(required = true, multiple = false)]
    pub struct KindFlags {
        #[arg(long)]
        pub image: bool,
        #[arg(long)]
        pub table: bool,
        #[arg(long)]
        pub file: bool,
    }

    impl KindFlags {
        pub fn kind(&self) -> ResourceKind {
            if self.table {
                ResourceKind::Table
            } else if self.file {
                ResourceKind::File
            } else {
                ResourceKind::Image
            }
        }
    }

    impl DeclareArgs {
        pub fn mode(&self) -> DeclareMode {
            match (self.yes, self.keep) {
                (true, _) => DeclareMode::Overwrite,
                (false, true) => DeclareMode::Keep,
                (false, false) => DeclareMode::Ask,
            }
        }
    }

    impl Command {
        /// Field update carried by `set`, if this is one.
        pub fn field_update(&self) -> Option<FieldUpdate> {
            match self {
                Command::Set {
                    name,
                    author,
                    description,
                } => Some(FieldUpdate {
                    name: name.clone(),
                    author: author.clone(),
                    description: description.clone(),
                }),
                _ => None,
            }
        }
    }

}
