use clap::Parser;
use coderelay::cli::{AskArgs, Cli, Commands, PackArgs, SplitArgs};

#[test]
fn pack_flag_parsing() {
    // Given
    let argv = vec![
        "relay", "pack", "src", "lib", "-e", "py,rs", "--exclude", "**/gen/**", "--gitignore",
        "--snapshot", "snap.json", "--quiet",
    ];

    // When
    let cmd = Cli::parse_from(argv);

    // Then
    assert!(cmd.quiet);
    match cmd.command {
        Commands::Pack(PackArgs { roots, selection, snapshot, clipboard, .. }) => {
            assert_eq!(roots.len(), 2);
            assert_eq!(selection.extensions.as_deref(), Some("py,rs"));
            assert_eq!(selection.exclude, vec!["**/gen/**"]);
            assert!(selection.gitignore);
            assert!(!selection.no_hidden);
            assert!(snapshot.is_some());
            assert!(!clipboard);
        }
        _ => panic!("expected Pack command"),
    }
}

#[test]
fn split_flag_parsing() {
    let cmd = Cli::parse_from(["relay", "--dry-run", "split", "reply.txt", "-o", "out", "-f", "--flatten"]);

    assert!(cmd.dry_run);
    match cmd.command {
        Commands::Split(SplitArgs { input, output, json }) => {
            assert!(input.reply.is_some_and(|p| p.ends_with("reply.txt")));
            assert!(!input.stdin);
            assert!(output.force);
            assert!(output.flatten);
            assert!(!output.unescape_xml);
            assert!(!json);
        }
        _ => panic!("expected Split command"),
    }
}

#[test]
fn ask_flag_parsing() {
    let cmd = Cli::parse_from([
        "relay", "ask", "add a test", "-s", "src", "-s", "tests", "--write", "--session", "last",
        "-m", "big-model",
    ]);

    match cmd.command {
        Commands::Ask(AskArgs { instruction, write, session, .. }) => {
            assert_eq!(instruction, "add a test");
            assert!(write);
            assert_eq!(session.sources.len(), 2);
            assert_eq!(session.session.as_deref(), Some("last"));
            assert_eq!(session.model.as_deref(), Some("big-model"));
        }
        _ => panic!("expected Ask command"),
    }
}

#[test]
fn pack_requires_a_root() {
    assert!(Cli::try_parse_from(["relay", "pack"]).is_err());
}
