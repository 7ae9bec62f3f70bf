use std::io::{self, IsTerminal, Write};
use std::path::Path;

use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::deadline::ProgressState;
use crate::task::TaskId;
use crate::view::{
    ACTIVE_TITLE, COMPLETED_TITLE, EMPTY_PLACEHOLDER, Group, ItemView, ListView, Progress, Row,
};

const BAR_CELLS: usize = 10;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    /// Colour needs both the `color` setting and a terminal on stdout.
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: cfg.color && io::stdout().is_terminal(),
        }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all)]
    pub fn print_view(&self, view: &ListView, editing: Option<TaskId>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_view(&mut out, view, editing)
    }

    pub fn write_view<W: Write>(
        &self,
        mut out: W,
        view: &ListView,
        editing: Option<TaskId>,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(&view.counter, "1"))?;

        let text_width = view
            .items()
            .map(|item| UnicodeWidthStr::width(item.text.as_str()))
            .max()
            .unwrap_or(0);
        let pos_width = view
            .items()
            .map(|item| item.position.to_string().len())
            .max()
            .unwrap_or(1);

        for row in &view.rows {
            match row {
                Row::Placeholder => writeln!(out, "  {}", self.paint(EMPTY_PLACEHOLDER, "2"))?,
                Row::Header { group, folded } => {
                    let title = match group {
                        Group::Active => ACTIVE_TITLE,
                        Group::Completed => COMPLETED_TITLE,
                    };
                    let marker = match folded {
                        Some(true) => " [+]",
                        Some(false) => " [-]",
                        None => "",
                    };
                    writeln!(out, "{}{}", self.paint(title, "1;4"), marker)?;
                }
                Row::Item(item) => {
                    let line = self.item_line(item, editing == Some(item.id), text_width, pos_width);
                    writeln!(out, "{line}")?;
                }
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_settings(&self, data_dir: &Path, export_dir: &Path) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_settings(&mut out, data_dir, export_dir)
    }

    pub fn write_settings<W: Write>(
        &self,
        mut out: W,
        data_dir: &Path,
        export_dir: &Path,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint("Settings", "1;4"))?;
        writeln!(out, "  data      {}", data_dir.display())?;
        writeln!(out, "  backups   {}", export_dir.display())?;
        writeln!(out, "  export | import <file> | close")?;
        Ok(())
    }

    fn item_line(&self, item: &ItemView, editing: bool, text_width: usize, pos_width: usize) -> String {
        let check = if item.completed { "[x]" } else { "[ ]" };
        let star = if item.important {
            self.paint("*", "33")
        } else {
            " ".to_string()
        };

        let padding = text_width.saturating_sub(UnicodeWidthStr::width(item.text.as_str()));
        let text = if item.completed {
            self.paint(&item.text, "2;9")
        } else if editing {
            self.paint(&item.text, "7")
        } else {
            item.text.clone()
        };

        let mut line = format!(
            "{:>pos_width$}. {check} {star} {text}{}",
            item.position,
            " ".repeat(padding),
        );

        if let Some(progress) = item.progress {
            line.push_str("  ");
            line.push_str(&self.progress_bar(progress));
        }
        if item.important {
            line.push_str("  ");
            line.push_str(&self.paint("important", "33"));
        }
        if let Some(remaining) = &item.remaining {
            line.push_str("  ");
            let code = match item.progress.map(|p| p.state) {
                Some(ProgressState::Expired) => "31",
                Some(ProgressState::NearDue) => "33",
                _ => "36",
            };
            line.push_str(&self.paint(&format!("({remaining})"), code));
        }
        line.push_str("  ");
        line.push_str(&self.paint(&item.created_at, "2"));
        if editing {
            line.push_str("  ");
            line.push_str(&self.paint("editing", "7"));
        }
        line
    }

    fn progress_bar(&self, progress: Progress) -> String {
        let filled = (usize::from(progress.percent) * BAR_CELLS / 100).min(BAR_CELLS);
        let bar = format!(
            "[{}{}] {:>3}%",
            "#".repeat(filled),
            "-".repeat(BAR_CELLS - filled),
            progress.percent
        );
        match progress.state {
            ProgressState::Expired => self.paint(&bar, "31"),
            ProgressState::NearDue => self.paint(&bar, "33"),
            ProgressState::OnTrack => self.paint(&bar, "32"),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::Group;

    fn item(position: usize, text: &str) -> ItemView {
        ItemView {
            position,
            id: TaskId::new(),
            text: text.to_string(),
            completed: false,
            important: false,
            progress: None,
            remaining: None,
            created_at: "2024-06-01 09:00:00".to_string(),
        }
    }

    fn render(view: &ListView, editing: Option<TaskId>) -> String {
        let mut buf = Vec::new();
        Renderer::plain()
            .write_view(&mut buf, view, editing)
            .expect("render view");
        String::from_utf8(buf).expect("utf8 output")
    }

    #[test]
    fn renders_placeholder() {
        let view = ListView {
            rows: vec![Row::Placeholder],
            counter: "0 tasks".to_string(),
        };
        assert_eq!(render(&view, None), format!("0 tasks\n  {EMPTY_PLACEHOLDER}\n"));
    }

    #[test]
    fn renders_rows_with_badges() {
        let mut urgent = item(1, "ship release");
        urgent.important = true;
        urgent.progress = Some(Progress {
            percent: 85,
            state: ProgressState::NearDue,
        });
        urgent.remaining = Some("15m".to_string());
        let mut done = item(2, "write notes");
        done.completed = true;

        let view = ListView {
            rows: vec![
                Row::Header {
                    group: Group::Active,
                    folded: None,
                },
                Row::Item(urgent),
                Row::Header {
                    group: Group::Completed,
                    folded: Some(false),
                },
                Row::Item(done),
            ],
            counter: "active 1, completed 1".to_string(),
        };

        let out = render(&view, None);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "active 1, completed 1");
        assert_eq!(lines[1], "Active");
        assert!(lines[2].starts_with("1. [ ] * ship release"));
        assert!(lines[2].contains("[########--]  85%"));
        assert!(lines[2].contains("important"));
        assert!(lines[2].contains("(15m)"));
        assert_eq!(lines[3], "Completed [-]");
        assert!(lines[4].starts_with("2. [x]   write notes "));
    }

    #[test]
    fn marks_row_being_edited() {
        let row = item(1, "draft");
        let id = row.id;
        let view = ListView {
            rows: vec![Row::Item(row)],
            counter: "active 1".to_string(),
        };
        assert!(render(&view, Some(id)).contains("editing"));
        assert!(!render(&view, None).contains("editing"));
    }

    #[test]
    fn color_off_in_config_disables_paint() {
        let cfg = Config {
            color: false,
            ..Config::default()
        };
        let view = ListView {
            rows: vec![Row::Item(item(1, "plain"))],
            counter: "active 1".to_string(),
        };
        let mut buf = Vec::new();
        Renderer::new(&cfg)
            .write_view(&mut buf, &view, None)
            .expect("render view");
        assert!(!String::from_utf8(buf).expect("utf8 output").contains('\x1b'));
    }

    #[test]
    fn settings_panel_lists_locations() {
        let mut buf = Vec::new();
        Renderer::plain()
            .write_settings(&mut buf, Path::new("/data"), Path::new("/backups"))
            .expect("render settings");
        let out = String::from_utf8(buf).expect("utf8 output");
        assert!(out.starts_with("Settings\n"));
        assert!(out.contains("data      /data"));
        assert!(out.contains("backups   /backups"));
    }
}
