//! ntfslink CLI
//!
//! Command-line interface for junction management, raw reparse-point
//! inspection, and hard-link enumeration.

#![cfg_attr(not(windows), allow(unused))]

#[cfg(windows)]
mod cli {
    use clap::{Parser, Subcommand};
    use console::style;
    use ntfslink::mft::structs::filetime_to_datetime;
    use ntfslink::{
        create_junction, delete_junction, delete_junction_record, delete_reparse_point,
        directory_state, is_junction, links_of_path, read_junction, read_reparse_point,
        DirectoryState, NtfsLinkError, ReparseBuffer, VolumeContext,
    };

    /// ntfslink - NTFS junction, reparse point and hard-link toolkit
    #[derive(Parser)]
    #[command(name = "ntfslink")]
    #[command(author = "ntfslink Contributors")]
    #[command(version)]
    #[command(about = "Manage NTFS junctions and reparse points, enumerate hard links", long_about = None)]
    struct Cli {
        #[command(subcommand)]
        command: Commands,
    }

    #[derive(Subcommand)]
    enum Commands {
        /// Junction (mount point) operations
        Junction {
            #[command(subcommand)]
            action: JunctionAction,
        },

        /// Tag-agnostic reparse point operations
        Reparse {
            #[command(subcommand)]
            action: ReparseAction,
        },

        /// List every hard-link name of a file
        Links {
            /// File whose names to enumerate
            path: String,

            /// Show $FILE_NAME timestamps alongside each link
            #[arg(short, long)]
            long: bool,

            /// Output format (text, json)
            #[arg(short, long, default_value = "text")]
            output: String,
        },
    }

    #[derive(Subcommand)]
    enum JunctionAction {
        /// Create a junction pointing at an existing directory
        Create {
            /// Path of the junction to create
            link: String,
            /// Directory the junction should resolve to
            target: String,
        },

        /// Delete a junction (reparse data and directory)
        Delete {
            path: String,

            /// Remove only the reparse data, keeping the empty directory
            #[arg(long)]
            keep_dir: bool,
        },

        /// Print the target of a junction
        Read { path: String },

        /// Report whether a path is a junction
        Check { path: String },
    }

    #[derive(Subcommand)]
    enum ReparseAction {
        /// Decode and display the reparse point at a path
        Read {
            path: String,

            /// Output format (text, json)
            #[arg(short, long, default_value = "text")]
            output: String,
        },

        /// Remove the reparse point at a path, keeping the file/directory
        Delete { path: String },
    }

    fn describe_buffer(buffer: &ReparseBuffer) {
        match buffer {
            ReparseBuffer::MountPoint {
                substitute_name,
                print_name,
            } => {
                println!("{}: mount point", style("tag").bold());
                println!("  substitute: {}", substitute_name);
                if !print_name.is_empty() {
                    println!("  print:      {}", print_name);
                }
            }
            ReparseBuffer::SymbolicLink {
                substitute_name,
                print_name,
                flags,
            } => {
                println!("{}: symbolic link", style("tag").bold());
                println!("  substitute: {}", substitute_name);
                if !print_name.is_empty() {
                    println!("  print:      {}", print_name);
                }
                println!("  flags:      0x{:08X}", flags);
            }
            ReparseBuffer::Generic { tag, guid, data } => {
                println!("{}: 0x{:08X}", style("tag").bold(), tag);
                if let Some(guid) = guid {
                    println!("  guid: {}", guid);
                }
                println!("  data: {} bytes", data.len());
            }
        }
    }

    fn run() -> Result<(), NtfsLinkError> {
        let cli = Cli::parse();

        match cli.command {
            Commands::Junction { action } => match action {
                JunctionAction::Create { link, target } => {
                    create_junction(&link, &target)?;
                    println!(
                        "{} {} -> {}",
                        style("created").green().bold(),
                        link,
                        target
                    );
                }
                JunctionAction::Delete { path, keep_dir } => {
                    if keep_dir {
                        delete_junction_record(&path)?;
                    } else {
                        delete_junction(&path)?;
                    }
                    println!("{} {}", style("deleted").green().bold(), path);
                }
                JunctionAction::Read { path } => {
                    println!("{}", read_junction(&path)?);
                }
                JunctionAction::Check { path } => {
                    let state = directory_state(&path);
                    let verdict = if is_junction(&path) {
                        style("junction").green()
                    } else {
                        style("not a junction").red()
                    };
                    println!("{} ({:?})", verdict, state);
                    if state != DirectoryState::Junction {
                        std::process::exit(1);
                    }
                }
            },

            Commands::Reparse { action } => match action {
                ReparseAction::Read { path, output } => {
                    let buffer = read_reparse_point(&path)?;
                    if output == "json" {
                        println!("{}", serde_json::to_string_pretty(&buffer).unwrap());
                    } else {
                        describe_buffer(&buffer);
                    }
                }
                ReparseAction::Delete { path } => {
                    delete_reparse_point(&path)?;
                    println!("{} {}", style("deleted").green().bold(), path);
                }
            },

            Commands::Links { path, long, output } => {
                let mut context = VolumeContext::new();
                let (drive, set) = links_of_path(&mut context, &path)?;

                if output == "json" {
                    println!("{}", serde_json::to_string_pretty(&set).unwrap());
                } else {
                    println!(
                        "{} hard link{} (record {}):",
                        set.link_count,
                        if set.link_count == 1 { "" } else { "s" },
                        set.file_reference
                    );
                    for entry in &set.links {
                        if long {
                            println!(
                                "  {}  {}  {}",
                                filetime_to_datetime(entry.creation_time)
                                    .format("%Y-%m-%d %H:%M:%S"),
                                filetime_to_datetime(entry.modification_time)
                                    .format("%Y-%m-%d %H:%M:%S"),
                                entry.path.with_drive(drive)
                            );
                        } else {
                            println!("  {}", entry.path.with_drive(drive));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    pub fn main() {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

        if let Err(e) = run() {
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    }
}

#[cfg(windows)]
fn main() {
    cli::main();
}

#[cfg(not(windows))]
fn main() {
    eprintln!("ntfslink only runs on Windows (it talks to the NTFS device-control interface)");
    std::process::exit(1);
}
