//! blockvol operator CLI
//!
//! Inspect, verify and pack block volumes on the local filesystem

use anyhow::{bail, Context, Result};
use blockvol::core::hash::HASH_SIZE;
use blockvol::{
    filter_listing, prepare_download, prepare_upload, AesGcmModule, BlockReader, BlockWriter,
    CodecRegistry, ContentHash, DownloadedVolume, EncryptionModule, VolumeConfig,
};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "blockvol")]
#[command(about = "Content-addressed block volume tool")]
struct Args {
    /// Volume configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Environment variable holding the encryption passphrase
    #[arg(long, global = true, default_value = "BLOCKVOL_PASSPHRASE")]
    key_env: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse remote file names and show the ones that are volumes
    ParseName {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Show the manifest and blocks of a volume
    Inspect { file: PathBuf },

    /// Re-hash every block of a volume
    Verify { file: PathBuf },

    /// Chunk files into block volumes
    Pack {
        /// Directory receiving finished volumes
        #[arg(short, long)]
        out: PathBuf,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<VolumeConfig> {
    match path {
        Some(path) => VolumeConfig::load(path)
            .with_context(|| format!("failed to load configuration {:?}", path)),
        None => Ok(VolumeConfig::default()),
    }
}

fn encryption_module(config: &VolumeConfig, key_env: &str) -> Result<Option<AesGcmModule>> {
    let name = match &config.encryption {
        Some(name) => name,
        None => return Ok(None),
    };
    if name != AesGcmModule::NAME {
        bail!("unsupported encryption module '{}'", name);
    }
    let passphrase = std::env::var(key_env)
        .with_context(|| format!("encryption is enabled but {} is not set", key_env))?;
    Ok(Some(AesGcmModule::from_passphrase(&passphrase)))
}

/// Open `file`, decrypting it first when its name says so
fn open_volume(
    file: &Path,
    config: &VolumeConfig,
    registry: &CodecRegistry,
    key_env: &str,
) -> Result<(Option<DownloadedVolume>, BlockReader)> {
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("volume path has no file name")?;

    if filter_listing([file_name]).is_empty() {
        debug!("{} is not a remote volume name, opening as is", file_name);
        let reader = BlockReader::open(file, config, registry)?;
        return Ok((None, reader));
    }

    let passphrase = std::env::var(key_env).ok();
    let module = passphrase.as_deref().map(AesGcmModule::from_passphrase);
    let volume = prepare_download(
        file,
        file_name,
        module.as_ref().map(|m| m as &dyn EncryptionModule),
        &config.temp_dir,
    )?;
    let reader = volume.open(config, registry)?;
    Ok((Some(volume), reader))
}

fn parse_names(names: &[String]) {
    let volumes = filter_listing(names);
    for volume in &volumes {
        let kind = &volume.name.kind;
        println!(
            "{}\n  type: {}\n  prefix: {}\n  {}: {}\n  compression: {}\n  encryption: {}",
            volume.file_name,
            volume.volume_type(),
            volume.name.prefix,
            if kind.time().is_some() { "time" } else { "guid" },
            kind.disambiguator(),
            volume.name.compression,
            volume.name.encryption.as_deref().unwrap_or("none"),
        );
    }
    info!("{} of {} names are volumes", volumes.len(), names.len());
}

fn inspect(file: &Path, config: &VolumeConfig, key_env: &str) -> Result<()> {
    let registry = CodecRegistry::default();
    let (_volume, mut reader) = open_volume(file, config, &registry, key_env)?;

    let manifest = reader.manifest()?.clone();
    println!("volume:     {}", file.display());
    println!("version:    {}", manifest.document.version);
    println!("created:    {}", manifest.document.created);
    println!("encoding:   {}", manifest.document.encoding);
    println!("blocksize:  {}", manifest.block_size());
    println!("hash:       {}", manifest.document.primary_hash);

    let blocks = reader.enumerate_blocks()?;
    let total: u64 = blocks.iter().map(|b| b.size).sum();
    for block in &blocks {
        println!("{:>10}  {}", block.size, block.id);
    }
    println!("{} blocks, {} bytes", blocks.len(), total);
    Ok(())
}

fn verify(file: &Path, config: &VolumeConfig, key_env: &str) -> Result<()> {
    let registry = CodecRegistry::default();
    let (_volume, mut reader) = open_volume(file, config, &registry, key_env)?;

    let report = reader.verify()?;
    for id in &report.corrupt {
        println!("corrupt: {}", id);
    }
    if !report.is_ok() {
        bail!(
            "{} of {} blocks in {} are corrupt",
            report.corrupt.len(),
            report.checked,
            file.display()
        );
    }
    println!("{} blocks verified", report.checked);
    Ok(())
}

/// Fill `buf` from `reader`, returning fewer bytes only at end of input
fn read_chunk(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

struct Packer<'a> {
    config: &'a VolumeConfig,
    registry: CodecRegistry,
    module: Option<AesGcmModule>,
    out: &'a Path,
    writer: Option<BlockWriter>,
    uploaded: HashSet<ContentHash>,
    volumes: Vec<PathBuf>,
}

impl<'a> Packer<'a> {
    fn writer(&mut self) -> Result<&mut BlockWriter> {
        if self.writer.is_none() {
            self.writer = Some(BlockWriter::create(self.config, &self.registry)?);
        }
        self.writer.as_mut().context("no open volume")
    }

    fn add(&mut self, hash: ContentHash, data: &[u8]) -> Result<()> {
        if self.uploaded.contains(&hash) {
            return Ok(());
        }
        self.writer()?.add_block(&hash, data, data.len())?;
        self.uploaded.insert(hash);
        self.roll_over_if_full()
    }

    fn add_blocklist(&mut self, hashes: &[ContentHash]) -> Result<ContentHash> {
        let hash = self.writer()?.add_blocklist(hashes)?;
        self.uploaded.insert(hash);
        self.roll_over_if_full()?;
        Ok(hash)
    }

    fn roll_over_if_full(&mut self) -> Result<()> {
        let full = self
            .writer
            .as_ref()
            .map_or(false, |w| w.filesize() >= self.config.volume_size);
        if full {
            self.finish_volume()?;
        }
        Ok(())
    }

    fn finish_volume(&mut self) -> Result<()> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => return Ok(()),
        };
        let blocks = writer.block_count();
        let upload = prepare_upload(
            writer,
            self.module.as_ref().map(|m| m as &dyn EncryptionModule),
            &self.config.temp_dir,
        )?;
        let path = upload.persist_in(self.out)?;
        info!("Wrote {} ({} blocks)", path.display(), blocks);
        self.volumes.push(path);
        Ok(())
    }

    fn pack_file(&mut self, path: &Path) -> Result<()> {
        let mut file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
        let mut buf = vec![0u8; self.config.block_size as usize];
        let mut hashes = Vec::new();
        let mut size = 0u64;

        loop {
            let n = read_chunk(&mut file, &mut buf)?;
            if n == 0 {
                break;
            }
            let hash = ContentHash::compute(&buf[..n]);
            self.add(hash, &buf[..n])?;
            hashes.push(hash);
            size += n as u64;
            if n < buf.len() {
                break;
            }
        }

        let per_list = (self.config.block_size as usize / HASH_SIZE).max(1);
        let mut lists = Vec::new();
        if hashes.len() > 1 {
            for group in hashes.chunks(per_list) {
                lists.push(self.add_blocklist(group)?);
            }
        }

        println!(
            "{}: {} bytes, {} blocks, {} blocklists",
            path.display(),
            size,
            hashes.len(),
            lists.len()
        );
        for list in &lists {
            println!("  blocklist {}", list.to_block_id());
        }
        Ok(())
    }
}

fn pack(files: &[PathBuf], out: &Path, config: &VolumeConfig, key_env: &str) -> Result<()> {
    std::fs::create_dir_all(out).with_context(|| format!("failed to create {:?}", out))?;

    let mut packer = Packer {
        config,
        registry: CodecRegistry::default(),
        module: encryption_module(config, key_env)?,
        out,
        writer: None,
        uploaded: HashSet::new(),
        volumes: Vec::new(),
    };

    for file in files {
        packer.pack_file(file)?;
    }
    packer.finish_volume()?;

    println!("{} volumes written to {}", packer.volumes.len(), out.display());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match &args.command {
        Command::ParseName { names } => parse_names(names),
        Command::Inspect { file } => inspect(file, &config, &args.key_env)?,
        Command::Verify { file } => verify(file, &config, &args.key_env)?,
        Command::Pack { out, files } => pack(files, out, &config, &args.key_env)?,
    }
    Ok(())
}
