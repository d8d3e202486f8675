use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;

use gitres_contenthash::{ContentHasher, MemoryBackend};
use gitres_refs::is_commit_sha;
use gitres_resolver::{
    EnvSockets, GitCli, GitRef, GraphEngine, LocalEngine, RefRequest, RepoRequest, RepositorySummary,
    RequestContext, Resolver, ResolverConfig, SecretHandle, SocketHandle,
};

use crate::cli::*;

const CLIENT_ID: &str = "gitres-cli";

#[derive(Serialize)]
struct RefOutput<'a> {
    name: &'a str,
    sha: &'a str,
    digest: String,
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => ResolverConfig::load(path)?,
        None => ResolverConfig::default(),
    };
    tracing::debug!(?config, "resolver config");
    let engine = engine(config);
    let ctx = context();
    let format = cli.format;

    match cli.command {
        Command::Resolve(args) => cmd_resolve(&engine, &ctx, format, args).await,
        Command::Ref(args) => cmd_ref(&engine, &ctx, format, args).await,
        Command::Tags(args) => cmd_list(&engine, &ctx, format, args, true).await,
        Command::Branches(args) => cmd_list(&engine, &ctx, format, args, false).await,
        Command::MergeBase(args) => cmd_merge_base(&engine, &ctx, format, args).await,
        Command::LatestVersion(args) => cmd_latest_version(&engine, &ctx, format, args).await,
    }
}

fn engine(config: ResolverConfig) -> LocalEngine {
    let transport = Arc::new(GitCli::new(&config));
    // the CLI never checks trees out, so an empty backend is enough
    let hasher = Arc::new(ContentHasher::new(Arc::new(MemoryBackend::new())));
    let resolver = Resolver::new(transport, hasher, config).with_sockets(Arc::new(EnvSockets));
    LocalEngine::new(resolver)
}

/// A context cancelled by Ctrl-C.
fn context() -> RequestContext {
    let ctx = RequestContext::new(CLIENT_ID);
    let cancel = ctx.cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
    ctx
}

fn repo_request(args: &RepoArgs) -> anyhow::Result<RepoRequest> {
    let mut request = if args.local {
        RepoRequest::local(&args.repo)
    } else {
        RepoRequest::remote(&args.repo)
    };
    if let Some(var) = &args.token_env {
        let token = std::env::var(var).with_context(|| format!("${var} is not set"))?;
        request = request.with_auth_token(SecretHandle::from_plaintext(token));
    }
    if let Some(username) = &args.username {
        request = request.with_auth_username(username);
    }
    if args.ssh_agent {
        let Some(path) = std::env::var_os("SSH_AUTH_SOCK").filter(|p| !p.is_empty()) else {
            bail!("--ssh-agent given but SSH_AUTH_SOCK is not set");
        };
        request = request.with_ssh_auth_socket(SocketHandle::for_client(CLIENT_ID, path));
    }
    if let Some(commit) = &args.commit {
        request = request.with_commit(commit);
    }
    Ok(request.with_keep_git_dir(args.keep_git_dir))
}

fn ref_request(repo: RepoRequest, name: &str) -> anyhow::Result<RefRequest> {
    if is_commit_sha(name) {
        Ok(RefRequest::commit(repo, name)?)
    } else if name == "HEAD" {
        Ok(RefRequest::head(repo))
    } else {
        Ok(RefRequest::named(repo, name))
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_resolve(
    engine: &LocalEngine,
    ctx: &RequestContext,
    format: OutputFormat,
    args: ResolveArgs,
) -> anyhow::Result<()> {
    let resolved = engine.resolve_repository(ctx, repo_request(&args.repo)?).await?;
    let summary = RepositorySummary::from(&**resolved.value());
    if format == OutputFormat::Json {
        return print_json(&summary);
    }

    println!("{} {}", "✓".green().bold(), summary.url.as_deref().unwrap_or(&args.repo.repo).bold());
    match &summary.head {
        Some(head) => println!("  HEAD: {} {}", head.name.yellow(), head.sha.dimmed()),
        None => println!("  HEAD: {}", "(none)".dimmed()),
    }
    println!("  Digest: {}", resolved.digest().to_string().cyan());
    Ok(())
}

async fn cmd_ref(
    engine: &LocalEngine,
    ctx: &RequestContext,
    format: OutputFormat,
    args: RefArgs,
) -> anyhow::Result<()> {
    let request = ref_request(repo_request(&args.repo)?, &args.name)?;
    let resolved = engine.resolve_ref(ctx, request).await?;
    print_ref(format, resolved.value(), resolved.digest().to_string())
}

fn print_ref(format: OutputFormat, git_ref: &GitRef, digest: String) -> anyhow::Result<()> {
    let reference = git_ref.reference();
    if format == OutputFormat::Json {
        return print_json(&RefOutput {
            name: &reference.name,
            sha: &reference.sha,
            digest,
        });
    }
    println!("{} {}", reference.sha.yellow(), git_ref.ref_name().bold());
    println!("  Digest: {}", digest.cyan());
    Ok(())
}

async fn cmd_list(
    engine: &LocalEngine,
    ctx: &RequestContext,
    format: OutputFormat,
    args: ListArgs,
    tags: bool,
) -> anyhow::Result<()> {
    let request = repo_request(&args.repo)?;
    let names = if tags {
        engine.tags(ctx, request, &args.patterns).await?
    } else {
        engine.branches(ctx, request, &args.patterns).await?
    };
    if format == OutputFormat::Json {
        return print_json(&names);
    }
    if names.is_empty() {
        println!("{}", "No matching refs.".dimmed());
    }
    for name in &names {
        println!("{}", if tags { name.yellow() } else { name.green() });
    }
    Ok(())
}

async fn cmd_merge_base(
    engine: &LocalEngine,
    ctx: &RequestContext,
    format: OutputFormat,
    args: MergeBaseArgs,
) -> anyhow::Result<()> {
    let repo = repo_request(&args.repo)?;
    let left = GitRef::from_request(ref_request(repo.clone(), &args.left)?)?;
    let right = GitRef::from_request(ref_request(repo, &args.right)?)?;
    let base = engine.common_ancestor(ctx, left, right).await?;
    print_ref(format, base.value(), base.digest().to_string())
}

async fn cmd_latest_version(
    engine: &LocalEngine,
    ctx: &RequestContext,
    format: OutputFormat,
    args: ResolveArgs,
) -> anyhow::Result<()> {
    let latest = engine.latest_version(ctx, repo_request(&args.repo)?).await?;
    print_ref(format, latest.value(), latest.digest().to_string())
}
