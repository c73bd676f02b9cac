use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dhfs_core::{
	BatchReport, DhfsConfig, DhfsImage, ListingFilter, Progress, ProgressEvent, RecoveryMode,
	RecoveryReport, VideoListing,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dhfs", version, about = "DHFS4.1 DVR video extraction and recovery")]
struct Cli {
	/// Configuration file (CARVE_SIGNAT, DEBUG)
	#[arg(long, global = true)]
	config: Option<PathBuf>,
	/// Enable debug logging
	#[arg(short, long, global = true)]
	verbose: bool,
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Show the image metadata summary
	Info {
		/// Path to disk image or device
		image: PathBuf,
	},
	/// List live videos
	List {
		image: PathBuf,
		/// Only videos recorded on this date (YYYY-MM-DD)
		#[arg(long)]
		date: Option<String>,
		/// Only videos from this camera
		#[arg(long)]
		camera: Option<i32>,
		/// Write the listing as CSV to this file
		#[arg(long)]
		csv: Option<PathBuf>,
		/// Print the listing as JSON
		#[arg(long)]
		json: bool,
	},
	/// Decode a single descriptor
	Inspect {
		image: PathBuf,
		#[arg(long)]
		partition: usize,
		#[arg(long)]
		descriptor: u32,
		#[arg(long)]
		json: bool,
	},
	/// Export videos
	Export {
		image: PathBuf,
		#[command(flatten)]
		selection: Selection,
	},
	/// Export the slack space after the last fragment of videos
	Slack {
		image: PathBuf,
		#[command(flatten)]
		selection: Selection,
	},
	/// Recover video from free and dirty fragments
	Recover {
		image: PathBuf,
		/// Output directory
		#[arg(long)]
		out: PathBuf,
		/// Only carve free fragments
		#[arg(long, conflicts_with = "dirty_only")]
		free_only: bool,
		/// Only rebuild orphaned dirty chains
		#[arg(long)]
		dirty_only: bool,
	},
	/// Export the DVR log region
	Logs {
		image: PathBuf,
		/// Output file
		#[arg(long)]
		out: PathBuf,
		#[arg(long, default_value = "0")]
		partition: usize,
	},
}

#[derive(Args, Debug)]
struct Selection {
	/// Output directory
	#[arg(long)]
	out: PathBuf,
	/// Partition of each selected video (pairs with --descriptor)
	#[arg(long)]
	partition: Vec<usize>,
	/// Main descriptor of each selected video
	#[arg(long)]
	descriptor: Vec<u32>,
	/// Select every live video
	#[arg(long, conflicts_with_all = ["partition", "descriptor"])]
	all: bool,
}

impl Selection {
	fn resolve<S: dhfs_core::ByteSource>(&self, image: &DhfsImage<S>) -> Result<Vec<(usize, u32)>> {
		if self.all {
			return Ok(VideoListing::from_image(image)?.selection());
		}
		if self.partition.len() != self.descriptor.len() {
			bail!(
				"Got {} --partition and {} --descriptor values; they must come in pairs",
				self.partition.len(),
				self.descriptor.len()
			);
		}
		if self.partition.is_empty() {
			bail!("Nothing selected: pass --partition/--descriptor pairs or --all");
		}
		Ok(self
			.partition
			.iter()
			.copied()
			.zip(self.descriptor.iter().copied())
			.collect())
	}
}

fn init_tracing(debug: bool) {
	let default = if debug { "debug" } else { "info" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}

fn progress_bar() -> Result<ProgressBar> {
	let bar = ProgressBar::new(100);
	bar.set_style(
		ProgressStyle::default_bar()
			.template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}%")?
			.progress_chars("#>-"),
	);
	Ok(bar)
}

/// Forward engine progress events to an indicatif bar
fn bar_progress(bar: &ProgressBar) -> Progress<'_> {
	Progress::new(move |event: &ProgressEvent| {
		if let Some(percent) = event.percent {
			bar.set_position(percent.round() as u64);
		}
		bar.set_message(event.operation.clone());
	})
}

fn open_image(path: &Path, config: &DhfsConfig) -> Result<DhfsImage> {
	let bar = ProgressBar::new_spinner();
	let image = {
		let mut progress = bar_progress(&bar);
		DhfsImage::open_with(path, config.clone(), &mut progress)
			.with_context(|| format!("Failed to open {}", path.display()))?
	};
	bar.finish_and_clear();
	Ok(image)
}

fn create_out_dir(out: &Path) -> Result<()> {
	std::fs::create_dir_all(out)
		.with_context(|| format!("Failed to create output directory {}", out.display()))
}

fn print_batch(report: &BatchReport, what: &str) {
	for file in &report.exported {
		println!("💾 {} ({} bytes, sha256 {})", file.path.display(), file.bytes, file.sha256);
	}
	for (partition, descriptor) in &report.skipped {
		println!("⏭️  Partition {} descriptor {}: nothing to export", partition, descriptor);
	}
	for failure in &report.failed {
		eprintln!(
			"❌ Partition {} descriptor {}: {}",
			failure.partition, failure.descriptor, failure.error
		);
	}
	println!("✅ Exported {} {}", report.exported.len(), what);
}

fn print_recovery(report: &RecoveryReport) {
	for file in &report.files {
		println!("💾 {} ({} bytes, sha256 {})", file.path.display(), file.bytes, file.sha256);
	}
	for failure in &report.failed {
		eprintln!(
			"❌ Partition {} fragment {}: {}",
			failure.partition, failure.descriptor, failure.error
		);
	}
	println!("✅ Recovered {} files", report.count());
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	let (config, warnings) = match &cli.config {
		Some(path) => DhfsConfig::load(path)
			.with_context(|| format!("Failed to load config {}", path.display()))?,
		None => (DhfsConfig::default(), Vec::new()),
	};

	init_tracing(cli.verbose || config.debug);
	for warning in &warnings {
		tracing::warn!("Config {}", warning);
	}

	match cli.command {
		Commands::Info { image } => {
			println!("🔍 Reading {}", image.display());
			let image = open_image(&image, &config)?;
			println!("{}", image.metadata_summary());
		}
		Commands::List {
			image,
			date,
			camera,
			csv,
			json,
		} => {
			let image = open_image(&image, &config)?;
			let listing = VideoListing::from_image(&image)?.filter(&ListingFilter { date, camera });

			if let Some(csv_path) = csv {
				std::fs::write(&csv_path, listing.to_csv())
					.with_context(|| format!("Failed to write {}", csv_path.display()))?;
				println!("💾 Wrote {} rows to {}", listing.len(), csv_path.display());
			}

			if json {
				println!("{}", listing.to_json()?);
			} else {
				println!(
					"{:>4} {:>10} {:<10} {:<8} {:<8} {:>6} {:>12}",
					"Part", "Descriptor", "Date", "Start", "End", "Camera", "Size"
				);
				for record in &listing.records {
					println!(
						"{:>4} {:>10} {:<10} {:<8} {:<8} {:>6} {:>12}",
						record.partition,
						record.descriptor,
						record.date,
						record.start,
						record.end,
						record.camera_label(),
						record.size_mb()
					);
				}
				println!(
					"📈 {} videos, dates: {}, cameras: {}",
					listing.len(),
					listing.dates().join(", "),
					listing
						.cameras()
						.iter()
						.map(|c| format!("{:02}", c))
						.collect::<Vec<_>>()
						.join(", ")
				);
			}
		}
		Commands::Inspect {
			image,
			partition,
			descriptor,
			json,
		} => {
			let image = open_image(&image, &config)?;
			let details = image.descriptor_details(partition, descriptor)?;
			let class = image.partition(partition)?.view().classify(descriptor)?;

			if json {
				println!(
					"{}",
					serde_json::to_string_pretty(&serde_json::json!({
						"class": class,
						"descriptor": details,
					}))?
				);
			} else {
				println!("📋 Partition {} descriptor {}", details.partition, details.index);
				println!("Class: {:?}", class);
				println!("Type: {:?}", details.desc_type);
				println!("Camera: {:02}", details.camera);
				println!("Begin: {}", details.begin_time);
				println!("End: {}", details.end_time);
				println!("Frag number: {}", details.frag_number);
				if let Some(total) = details.total_fragments {
					println!("Total frags: {}", total);
				}
				println!("Begin descriptor: {}", details.begin_index);
				println!("Previous descriptor: {}", details.prev_index);
				println!("Next descriptor: {}", details.next_index);
				if let Some(last) = details.last_fragment_size {
					println!("Last fragment size: {}", last);
				}
				if let Some(size) = details.video_size {
					println!("Video size: {}", size);
				}
				println!("Raw: {}", details.hex);
			}
		}
		Commands::Export { image, selection } => {
			let image = open_image(&image, &config)?;
			let videos = selection.resolve(&image)?;
			create_out_dir(&selection.out)?;

			let bar = progress_bar()?;
			let report = {
				let mut progress = bar_progress(&bar);
				image
					.assembler()
					.export_videos(&videos, &selection.out, &mut progress)?
			};
			bar.finish_and_clear();
			print_batch(&report, "videos");
		}
		Commands::Slack { image, selection } => {
			let image = open_image(&image, &config)?;
			let videos = selection.resolve(&image)?;
			create_out_dir(&selection.out)?;

			let bar = progress_bar()?;
			let report = {
				let mut progress = bar_progress(&bar);
				image
					.assembler()
					.export_slacks(&videos, &selection.out, &mut progress)?
			};
			bar.finish_and_clear();
			print_batch(&report, "slack files");
		}
		Commands::Recover {
			image,
			out,
			free_only,
			dirty_only,
		} => {
			let mode = match (free_only, dirty_only) {
				(true, _) => RecoveryMode::FreeOnly,
				(_, true) => RecoveryMode::DirtyOnly,
				_ => RecoveryMode::All,
			};

			let image = open_image(&image, &config)?;
			create_out_dir(&out)?;
			println!(
				"🔄 Recovering from {} partitions (carve signature {})",
				image.partition_count(),
				config.carve_signature
			);

			let bar = progress_bar()?;
			let report = {
				let mut progress = bar_progress(&bar);
				image.recovery().recover_image(mode, &out, &mut progress)?
			};
			bar.finish_and_clear();
			print_recovery(&report);
		}
		Commands::Logs {
			image,
			out,
			partition,
		} => {
			let image = open_image(&image, &config)?;
			let exported = image
				.export_logs(partition, &out)
				.with_context(|| format!("Failed to export logs to {}", out.display()))?;
			println!(
				"✅ Saved {} bytes of logs to {} (sha256 {})",
				exported.bytes,
				exported.path.display(),
				exported.sha256
			);
		}
	}
	Ok(())
}
