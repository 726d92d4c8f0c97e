use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use squashscope_core::{open_image, BlockDevice, FileSystemType, InodeKind, SquashfsReader};

#[derive(Parser, Debug)]
#[command(name = "squashscope", version, about = "squashscope - SquashFS image metadata inspector")]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Detect filesystem type
	Detect {
		/// Path to image file
		image: PathBuf,
	},
	/// Show superblock information
	Info {
		image: PathBuf,
	},
	/// List every inode in decode order
	Inodes {
		image: PathBuf,
		/// Print JSON instead of a table
		#[arg(long)]
		json: bool,
	},
	/// List every directory entry in decode order
	Entries {
		image: PathBuf,
		/// Print JSON instead of a table
		#[arg(long)]
		json: bool,
	},
	/// Print all paths reachable from the root directory
	Tree {
		image: PathBuf,
	},
	/// Print the uid/gid table
	Ids {
		image: PathBuf,
	},
}

fn main() -> Result<()> {
	// Initialize tracing
	tracing_subscriber::fmt::init();

	let cli = Cli::parse();
	match cli.command {
		Commands::Detect { image } => {
			println!("🔍 Detecting file system type for: {}", image.display());

			match squashscope_core::fs::detect_filesystem(&image)? {
				Some(fs_type) => {
					println!("✅ Detected: {}", fs_type);

					if let Ok(info) = squashscope_core::fs::get_filesystem_info(&image, fs_type) {
						println!();
						println!("{}", info);
					}
				}
				None => {
					println!("❌ Unknown or unsupported file system");
				}
			}
		}
		Commands::Info { image } => {
			match squashscope_core::fs::get_filesystem_info(&image, FileSystemType::Squashfs) {
				Ok(info_str) => {
					println!("📋 File System Information:");
					println!("{}", info_str);
				}
				Err(e) => {
					eprintln!("❌ Failed to read filesystem info: {}", e);
					return Err(e);
				}
			}
		}
		Commands::Inodes { image, json } => {
			let contents = open_image(&image)?;
			if json {
				println!("{}", serde_json::to_string_pretty(&contents.inodes)?);
			} else {
				println!("{:>8}  {:<8}  {:>7}  {:>10}  {:>6}  {:>6}  DETAIL", "INODE", "TYPE", "MODE", "SIZE", "UID#", "GID#");
				for inode in &contents.inodes {
					let detail = match &inode.kind {
						InodeKind::Directory { parent_inode, .. } => format!("parent {}", parent_inode),
						InodeKind::File { block_sizes, fragment_index, .. } => {
							format!("{} blocks, fragment 0x{:x}", block_sizes.len(), fragment_index)
						}
						InodeKind::Symlink { target, .. } => format!("-> {}", target),
					};
					println!(
						"{:>8}  {:<8}  {:>7o}  {:>10}  {:>6}  {:>6}  {}",
						inode.inode_number(),
						inode.type_name(),
						inode.mode(),
						inode.size(),
						inode.header.uid_index,
						inode.header.gid_index,
						detail
					);
				}
				println!("📈 Inodes: {}", contents.inodes.len());
			}
		}
		Commands::Entries { image, json } => {
			let contents = open_image(&image)?;
			if json {
				println!("{}", serde_json::to_string_pretty(&contents.entries)?);
			} else {
				for entry in &contents.entries {
					println!("{:>8}  {:>8}  {}", entry.listing_offset, entry.inode_number, entry.name);
				}
				println!("📈 Directory entries: {}", contents.entries.len());
			}
		}
		Commands::Tree { image } => {
			let contents = open_image(&image)?;
			if contents.root_inode().is_none() {
				println!("⚠️  Root inode reference does not resolve");
			}
			for (path, inode) in contents.paths() {
				match &inode.kind {
					InodeKind::Symlink { target, .. } => println!("{} -> {}", path, target),
					_ => println!("{}", path),
				}
			}
		}
		Commands::Ids { image } => {
			let device = BlockDevice::open(&image)?;
			let mut reader = SquashfsReader::new(device.cursor())?;
			let ids = reader.read_id_table()?;
			for (index, id) in ids.ids.iter().enumerate() {
				println!("{:>5}  {}", index, id);
			}
			println!("📈 Ids: {}", ids.len());
		}
	}
	Ok(())
}
