use anyhow::Context;
use colored::Colorize;
use futures::{StreamExt, TryStreamExt};
use stowage_core::{bucket, BoxError, ByteStream, PutOptions, Stowage, StowageConfig};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;

use crate::cli::{Cli, Command, GetArgs, KeyArgs, LsArgs, PutArgs};

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = StowageConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(environment) = cli.environment {
        config.environment = environment;
    }
    let stowage = Stowage::from_environment(config.build_environment()?);
    tracing::debug!(environment = %stowage.tag(), "environment ready");

    match cli.command {
        Command::Buckets => cmd_buckets(&stowage),
        Command::Put(args) => cmd_put(&stowage, args).await,
        Command::Get(args) => cmd_get(&stowage, args).await,
        Command::Rm(args) => cmd_rm(&stowage, args).await,
        Command::Ls(args) => cmd_ls(&stowage, args).await,
    }
}

fn cmd_buckets(stowage: &Stowage) -> anyhow::Result<()> {
    println!("Environment: {}", stowage.tag().as_str().yellow().bold());
    for descriptor in bucket::descriptors() {
        let binding = descriptor.binding_name(stowage.tag());
        let status = if stowage.environment().lookup(binding).is_some() {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "  {} {:<14} {:<24} {}",
            status,
            descriptor.key().bold(),
            descriptor.base().cyan(),
            binding.dimmed()
        );
    }
    Ok(())
}

async fn cmd_put(stowage: &Stowage, args: PutArgs) -> anyhow::Result<()> {
    let stream: ByteStream = if args.source == "-" {
        Box::pin(ReaderStream::new(tokio::io::stdin()).map_err(BoxError::from))
    } else {
        let file = tokio::fs::File::open(&args.source)
            .await
            .with_context(|| format!("opening {}", args.source))?;
        Box::pin(ReaderStream::new(file).map_err(BoxError::from))
    };
    let options = args.content_type.map(PutOptions::with_content_type);

    let target = &args.target;
    stowage
        .bucket(target.bucket.descriptor())
        .set_stream(&target.key, stream, options)
        .await?;
    println!(
        "{} Stored {} in {}",
        "✓".green().bold(),
        target.key.yellow(),
        target.bucket.descriptor().base().cyan()
    );
    Ok(())
}

async fn cmd_get(stowage: &Stowage, args: GetArgs) -> anyhow::Result<()> {
    let target = &args.target;
    let Some(mut stream) = stowage
        .bucket(target.bucket.descriptor())
        .get_stream(&target.key, None)
        .await?
    else {
        anyhow::bail!(
            "no object {} in {}",
            target.key,
            target.bucket.descriptor().base()
        );
    };

    let mut out: Box<dyn AsyncWrite + Unpin + Send> = match &args.output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| anyhow::anyhow!(e))?;
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;

    if let Some(path) = &args.output {
        println!(
            "{} Wrote {} bytes to {}",
            "✓".green().bold(),
            written,
            path.display().to_string().bold()
        );
    }
    Ok(())
}

async fn cmd_rm(stowage: &Stowage, args: KeyArgs) -> anyhow::Result<()> {
    stowage
        .bucket(args.bucket.descriptor())
        .delete(&args.key)
        .await?;
    println!(
        "{} Deleted {} from {}",
        "✓".green().bold(),
        args.key.yellow(),
        args.bucket.descriptor().base().cyan()
    );
    Ok(())
}

async fn cmd_ls(stowage: &Stowage, args: LsArgs) -> anyhow::Result<()> {
    let keys = stowage.bucket(args.bucket.descriptor()).keys().await?;
    if keys.is_empty() {
        println!("No keys in {}.", args.bucket.descriptor().base().cyan());
    }
    for key in keys {
        println!("{key}");
    }
    Ok(())
}
