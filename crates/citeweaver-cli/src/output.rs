use std::io::Write;

use citeweaver_core::ProgressEvent;
use citeweaver_parsing::Heading;
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn shorten(title: &str, max: usize) -> String {
    if title.chars().count() > max {
        let cut: String = title.chars().take(max).collect();
        format!("{cut}...")
    } else {
        title.to_string()
    }
}

/// Print a real-time progress event.
pub fn print_progress(
    w: &mut dyn Write,
    event: &ProgressEvent,
    color: ColorMode,
) -> std::io::Result<()> {
    match event {
        ProgressEvent::Stage { stage } => {
            if color.enabled() {
                writeln!(w, "{} {}...", "==>".bold().cyan(), stage)?;
            } else {
                writeln!(w, "==> {}...", stage)?;
            }
        }
        ProgressEvent::SectionLocated { heading, chars } => match heading {
            Some(h) => writeln!(w, "    references under \"{}\" ({} chars)", h, chars)?,
            None => {
                if color.enabled() {
                    writeln!(w, "    {}", "no references heading found".yellow())?;
                } else {
                    writeln!(w, "    no references heading found")?;
                }
            }
        },
        ProgressEvent::BatchParsed {
            index,
            total,
            citations,
        } => {
            writeln!(
                w,
                "    [{}/{}] parsed {} citation(s)",
                index + 1,
                total,
                citations
            )?;
        }
        ProgressEvent::BatchSkipped { index, total } => {
            if color.enabled() {
                writeln!(
                    w,
                    "    [{}/{}] {}",
                    index + 1,
                    total,
                    "SKIPPED (parser failed twice)".red()
                )?;
            } else {
                writeln!(w, "    [{}/{}] SKIPPED (parser failed twice)", index + 1, total)?;
            }
        }
        ProgressEvent::LookupComplete {
            source,
            queried,
            matched,
            elapsed,
        } => {
            let line = format!(
                "    {}: {}/{} matched in {:.1}s",
                source,
                matched,
                queried,
                elapsed.as_secs_f64()
            );
            if color.enabled() {
                writeln!(w, "{}", line.dimmed())?;
            } else {
                writeln!(w, "{}", line)?;
            }
        }
        ProgressEvent::LookupFailed { source, message } => {
            if color.enabled() {
                writeln!(w, "    {} {}: {}", "WARNING:".yellow(), source, message)?;
            } else {
                writeln!(w, "    WARNING: {}: {}", source, message)?;
            }
        }
        ProgressEvent::Enriched {
            index,
            total,
            title,
            filled,
        } => {
            let short = shorten(title, 50);
            if filled.is_empty() {
                writeln!(w, "    [{}/{}] \"{}\" unchanged", index + 1, total, short)?;
            } else if color.enabled() {
                writeln!(
                    w,
                    "    [{}/{}] \"{}\" {} {}",
                    index + 1,
                    total,
                    short,
                    "+".green(),
                    filled.join(", ")
                )?;
            } else {
                writeln!(
                    w,
                    "    [{}/{}] \"{}\" + {}",
                    index + 1,
                    total,
                    short,
                    filled.join(", ")
                )?;
            }
        }
    }
    Ok(())
}

/// Print what the section locator found.
pub fn print_located(
    w: &mut dyn Write,
    file_name: &str,
    headings: &[Heading],
    chosen: Option<&str>,
    raw_citations: &[String],
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{} {}\n", "LOCATE:".bold().cyan(), file_name.bold())?;
    } else {
        writeln!(w, "LOCATE: {}\n", file_name)?;
    }

    writeln!(w, "Headings ({}):", headings.len())?;
    for h in headings {
        let marker = if Some(h.text.as_str()) == chosen { "*" } else { " " };
        let indent = "  ".repeat(usize::from(h.rank.saturating_sub(1)));
        writeln!(w, " {} {}{}", marker, indent, h.text)?;
    }
    writeln!(w)?;

    match chosen {
        Some(heading) => {
            if color.enabled() {
                writeln!(w, "References heading: {}", heading.green())?;
            } else {
                writeln!(w, "References heading: {}", heading)?;
            }
        }
        None => {
            if color.enabled() {
                writeln!(w, "{}", "No heading matched the reference keywords".yellow())?;
            } else {
                writeln!(w, "No heading matched the reference keywords")?;
            }
            return Ok(());
        }
    }

    writeln!(w, "Raw citations ({}):", raw_citations.len())?;
    for (i, raw) in raw_citations.iter().enumerate() {
        writeln!(w, "[{}] {}", i + 1, shorten(raw, 200))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn render(event: ProgressEvent) -> String {
        let mut buf = Vec::new();
        print_progress(&mut buf, &event, ColorMode(false)).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn plain_progress_lines() {
        assert_eq!(
            render(ProgressEvent::BatchSkipped { index: 1, total: 3 }),
            "    [2/3] SKIPPED (parser failed twice)\n"
        );
        assert_eq!(
            render(ProgressEvent::LookupComplete {
                source: "arXiv".into(),
                queried: 4,
                matched: 2,
                elapsed: Duration::from_millis(1500),
            }),
            "    arXiv: 2/4 matched in 1.5s\n"
        );
        assert_eq!(
            render(ProgressEvent::Enriched {
                index: 0,
                total: 1,
                title: "Paper".into(),
                filled: vec!["doi", "year"],
            }),
            "    [1/1] \"Paper\" + doi, year\n"
        );
    }

    #[test]
    fn long_titles_are_shortened_on_char_boundaries() {
        let title = "é".repeat(60);
        let out = render(ProgressEvent::Enriched {
            index: 0,
            total: 1,
            title,
            filled: vec![],
        });
        assert!(out.contains(&format!("{}...", "é".repeat(50))));
    }
}
