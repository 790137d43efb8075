use clap::Parser;
use coderelay::cli::{Cli, Commands};
use coderelay::core::exit::{INVALID_INPUT, finish_with_exit};
use coderelay::infra::logging;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help / --version print to stdout and succeed
            let code = if e.use_stderr() { INVALID_INPUT } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    // Build a context once, pass everywhere
    let ctx = cli.context();
    logging::init(ctx.verbose, ctx.no_color);

    let result = match cli.command {
        Commands::Pack(args) => coderelay::core::pack_run(args, &ctx),
        Commands::Split(args) => coderelay::core::split_run(args, &ctx),
        Commands::Check(args) => coderelay::core::check_run(args, &ctx),
        Commands::Ask(args) => coderelay::core::ask_run(args, &ctx),
        Commands::Chat(args) => coderelay::core::chat_run(args, &ctx),
        Commands::Changes(args) => coderelay::core::changes_run(args, &ctx),
        Commands::Init(args) => coderelay::infra::config_init(args, &ctx),
        Commands::Completions(args) => coderelay::completion::run(args, &ctx),
    };

    finish_with_exit(result)
}
