//! First-run setup: ask for the gateway connection and prompt settings, then write the config file.

use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::path::Path;

use crate::config::{self, Config};

pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:3001";
const END_MARKER: &str = "END";

/// Ensure the bot can start: a gateway URL must be configured.
pub fn require_initialized(config_path: &Path, config: &Config) -> Result<()> {
    if config.ws_url().is_none() {
        anyhow::bail!(
            "configuration not initialized; run `chatbridge init` first (no ws_url in {})",
            config_path.display()
        );
    }
    Ok(())
}

/// Interactive wizard. Reads answers from `input`, writes prompts to `output`, and returns
/// `base` updated with the answers. Sections the wizard does not ask about are kept as is.
pub fn run_wizard<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    base: Config,
) -> Result<Config> {
    let mut config = base;
    let rule = "=".repeat(50);
    writeln!(output, "{}\n  聊天机器人 - 首次配置\n{}\n", rule, rule)?;

    writeln!(output, "[1/4] 请输入WebSocket地址")?;
    writeln!(output, "示例: {}", DEFAULT_WS_URL)?;
    let ws_url = ask(input, output, "地址: ")?;
    let ws_url = if ws_url.is_empty() {
        writeln!(output, "使用默认地址: {}", DEFAULT_WS_URL)?;
        DEFAULT_WS_URL.to_string()
    } else {
        ws_url
    };
    config.ws_url = Some(ws_url);

    writeln!(output, "\n[2/4] 请输入Token（可选，直接回车跳过）")?;
    let token = ask(input, output, "Token: ")?;
    config.token = Some(token).filter(|t| !t.is_empty());

    writeln!(output, "\n[3/4] 请输入管理员QQ号（可选，直接回车跳过）")?;
    let admin = ask(input, output, "QQ号: ")?;
    config.admin_qq = parse_admin_qq(&admin);

    let dashes = "-".repeat(40);
    writeln!(output, "\n[4/4] 设置AI角色提示词\n{}", dashes)?;
    writeln!(output, "预设角色:")?;
    writeln!(output, "  1. 默认助手 - 友好热心的AI助手")?;
    writeln!(output, "  2. 自定义 - 输入你自己的角色设定")?;
    writeln!(output, "  3. 跳过 - 使用默认提示词\n{}", dashes)?;
    match ask(input, output, "选择 (1/2/3): ")?.as_str() {
        "2" => {
            writeln!(
                output,
                "\n请输入角色设定（多行输入，单独一行输入 '{}' 结束）:",
                END_MARKER
            )?;
            config.custom_prompt = Some(read_block(input)?);
            writeln!(output, "✓ 已保存自定义提示词")?;
        }
        "1" => {
            config.custom_prompt = None;
            writeln!(output, "✓ 使用默认助手提示词")?;
        }
        _ => config.custom_prompt = None,
    }
    Ok(config)
}

/// Run the wizard on stdin/stdout and save the result to `config_path`.
pub fn setup_interactive(config_path: &Path, base: Config) -> Result<Config> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stdout();
    let config = run_wizard(&mut input, &mut output, base)?;
    config::save_config(&config, config_path)?;
    log::info!("saved config to {}", config_path.display());
    writeln!(output, "\n✓ 配置已保存!\n").context("writing to stdout")?;
    Ok(config)
}

/// Digits only; anything else means no administrator.
fn parse_admin_qq(s: &str) -> Option<i64> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, label: &str) -> Result<String> {
    write!(output, "{}", label)?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line).context("reading answer")?;
    Ok(line.trim().to_string())
}

/// Lines up to a line that is exactly `END` (surrounding whitespace ignored) or end of input.
fn read_block<R: BufRead>(input: &mut R) -> Result<String> {
    let mut lines = Vec::new();
    for line in input.lines() {
        let line = line.context("reading prompt text")?;
        if line.trim() == END_MARKER {
            break;
        }
        lines.push(line);
    }
    Ok(lines.join("\n"))
}
