//! Filepath: src/infra/utils.rs
//! Small helpers shared by the commands: path expansion, clipboard access
//! and reading a reply from wherever the user points us.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Expand `~` and `$VAR` in a configured path.
pub fn expand_path(path: &Path) -> Result<PathBuf>
{
    let Some(text) = path.to_str()
    else
    {
        // Non-UTF-8 paths cannot contain anything to expand
        return Ok(path.to_path_buf());
    };

    let expanded = shellexpand::full(text)
        .with_context(|| format!("Failed to expand path {text}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

pub fn copy_to_clipboard(content: &str) -> Result<()>
{
    use arboard::Clipboard;

    let mut clipboard = Clipboard::new().context("Failed to access clipboard")?;

    clipboard
        .set_text(content)
        .context("Failed to copy to clipboard")?;

    Ok(())
}

pub fn read_clipboard() -> Result<String>
{
    use arboard::Clipboard;

    let mut clipboard = Clipboard::new().context("Failed to access clipboard")?;
    clipboard
        .get_text()
        .context("Failed to read text from clipboard")
}

/// Read a model reply from a file, stdin or the clipboard. Exactly one
/// source must be chosen; `-` as the file means stdin.
pub fn read_input(
    file: Option<&Path>,
    stdin: bool,
    from_clipboard: bool,
) -> Result<String>
{
    let use_stdin = stdin || file.is_some_and(|f| f == Path::new("-"));
    let file = file.filter(|f| *f != Path::new("-"));

    match (file, use_stdin, from_clipboard)
    {
        (Some(path), false, false) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read reply from {}", path.display())),
        (None, true, false) =>
        {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read reply from stdin")?;
            Ok(buf)
        }
        (None, false, true) => read_clipboard(),
        (None, false, false) => bail!("No reply given: pass a file, --stdin or --from-clipboard"),
        _ => bail!("Choose only one of a reply file, --stdin or --from-clipboard"),
    }
}
