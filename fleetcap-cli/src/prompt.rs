use anyhow::{bail, Context};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Numbered menus and confirmations over a line based terminal
pub struct Prompt<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> Prompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }

    async fn read_line(&mut self) -> anyhow::Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            bail!("input closed");
        }
        Ok(line.trim().to_string())
    }

    async fn write(&mut self, text: &str) -> anyhow::Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Pick one of `options` by number or by name. A single option is taken without asking.
    pub async fn choose(&mut self, title: &str, options: &[String]) -> anyhow::Result<String> {
        match options {
            [] => bail!("there is no {title} to choose from"),
            [only] => {
                self.write(&format!("Using {title} {only}\n")).await?;
                return Ok(only.clone());
            }
            _ => {}
        }
        let mut menu = format!("Select {title}:\n");
        for (n, option) in options.iter().enumerate() {
            menu.push_str(&format!("  {}) {option}\n", n + 1));
        }
        self.write(&menu).await?;

        loop {
            self.write("> ").await?;
            let answer = self.read_line().await
                .with_context(|| format!("choosing {title}"))?;
            if let Ok(n) = answer.parse::<usize>() {
                if (1..=options.len()).contains(&n) {
                    return Ok(options[n - 1].clone());
                }
            }
            if let Some(option) = options.iter().find(|o| **o == answer) {
                return Ok(option.clone());
            }
            self.write(&format!("'{answer}' is not one of the options\n")).await?;
        }
    }

    pub async fn wait_for_enter(&mut self, message: &str) -> anyhow::Result<()> {
        self.write(&format!("{message} ")).await?;
        self.read_line().await.context("waiting for confirmation")?;
        Ok(())
    }
}
