//! The interactive terminal UI: a live flow table with sorting, a filter
//! input with autocomplete and history, a conversation (biflow) view, and
//! a help overlay. Rendering a page of flows marks those flows as
//! accessed, which is what feeds the store's LRU protection.

mod render;

use crate::store::{FlowStore, SortField};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use flowscope_filter::suggest::SeenValues;
use flowscope_filter::{history, parse_filter, Filter};
use flowscope_types::{Conversation, Flow};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::collections::BTreeSet;
use std::io::stdout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub static SHOULD_EXIT: AtomicBool = AtomicBool::new(false);

/// How many flows are fetched per refresh. Scrolling beyond this fetches
/// nothing new; it is plenty for a terminal.
const FETCH_LIMIT: usize = 500;

pub struct TuiApp {
    store: Arc<FlowStore>,
    refresh: Duration,

    pub(crate) sort_field: SortField,
    pub(crate) sort_asc: bool,
    pub(crate) filter: Filter,
    pub(crate) filter_history: Vec<String>,

    pub(crate) input: String,
    pub(crate) input_mode: bool,
    pub(crate) suggestions: Vec<String>,
    pub(crate) suggestion_idx: usize,

    pub(crate) aggregate: bool,
    pub(crate) biflow: bool,
    pub(crate) show_service: bool,
    pub(crate) resolve_dns: bool,
    pub(crate) paused: bool,
    pub(crate) show_help: bool,
    pub(crate) scroll: usize,

    pub(crate) flows: Vec<Flow>,
    pub(crate) conversations: Vec<Conversation>,
}

impl TuiApp {
    pub fn new(store: Arc<FlowStore>, refresh: Duration) -> Self {
        Self {
            store,
            refresh,
            sort_field: SortField::Time,
            sort_asc: false,
            filter: Filter::default(),
            filter_history: history::load_history(),
            input: String::new(),
            input_mode: false,
            suggestions: Vec::new(),
            suggestion_idx: 0,
            aggregate: false,
            biflow: false,
            show_service: true,
            resolve_dns: false,
            paused: false,
            show_help: false,
            scroll: 0,
            flows: Vec::new(),
            conversations: Vec::new(),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        enable_raw_mode()?;
        stdout().execute(EnterAlternateScreen)?;
        let result = self.event_loop();
        Self::cleanup();
        result
    }

    fn cleanup() {
        let _ = disable_raw_mode();
        let _ = stdout().execute(LeaveAlternateScreen);
    }

    fn event_loop(&mut self) -> Result<()> {
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
        let mut last_refresh = Instant::now() - self.refresh;

        while !SHOULD_EXIT.load(Ordering::Relaxed) {
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code, key.modifiers);
                    }
                }
            }

            if !self.paused && last_refresh.elapsed() >= self.refresh {
                self.refresh_data();
                last_refresh = Instant::now();
            }

            terminal.draw(|frame| render::draw(frame, self))?;
        }
        Ok(())
    }

    /// Pulls a fresh snapshot and stamps the fetched page as accessed.
    fn refresh_data(&mut self) {
        let filter = if self.filter.is_empty() {
            None
        } else {
            Some(&self.filter)
        };

        if self.biflow {
            self.conversations = self.store.query_conversations(
                filter,
                self.sort_field,
                self.sort_asc,
                FETCH_LIMIT,
            );
        } else {
            self.flows = if self.aggregate {
                self.store
                    .query_aggregated(filter, self.sort_field, self.sort_asc, FETCH_LIMIT)
            } else {
                self.store
                    .query(filter, self.sort_field, self.sort_asc, FETCH_LIMIT)
            };

            let keys: Vec<String> = self.flows.iter().map(|f| f.flow_key()).collect();
            self.store.mark_accessed(&keys);
        }
    }

    fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) {
        if self.show_help {
            self.show_help = false;
            return;
        }
        if self.input_mode {
            self.handle_input_key(code);
            return;
        }

        match code {
            KeyCode::Char('q') => SHOULD_EXIT.store(true, Ordering::Relaxed),
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                SHOULD_EXIT.store(true, Ordering::Relaxed)
            }
            KeyCode::Char('f') | KeyCode::Char('/') => {
                self.input = self.filter.to_string();
                self.input_mode = true;
                self.suggestions.clear();
            }
            KeyCode::Char('c') => {
                self.filter = Filter::default();
                self.refresh_data();
            }
            KeyCode::Char('1') => self.toggle_sort(SortField::SrcIp),
            KeyCode::Char('2') => self.toggle_sort(SortField::DstIp),
            KeyCode::Char('3') => self.toggle_sort(SortField::Protocol),
            KeyCode::Char('4') => self.toggle_sort(SortField::Bytes),
            KeyCode::Char('5') => self.toggle_sort(SortField::Packets),
            KeyCode::Char('6') => self.toggle_sort(SortField::Time),
            KeyCode::Char('r') => {
                self.sort_asc = !self.sort_asc;
                self.refresh_data();
            }
            KeyCode::Char('a') => {
                self.aggregate = !self.aggregate;
                self.refresh_data();
            }
            KeyCode::Char('b') => {
                self.biflow = !self.biflow;
                self.scroll = 0;
                self.refresh_data();
            }
            KeyCode::Char('e') => self.show_service = !self.show_service,
            KeyCode::Char('n') => self.resolve_dns = !self.resolve_dns,
            KeyCode::Char(' ') => self.paused = !self.paused,
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Up | KeyCode::Char('k') => self.scroll = self.scroll.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => self.scroll_down(1),
            KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(20),
            KeyCode::PageDown => self.scroll_down(20),
            KeyCode::Home => self.scroll = 0,
            KeyCode::End => self.scroll = self.row_count().saturating_sub(1),
            _ => {}
        }
    }

    fn handle_input_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Enter => {
                self.apply_filter();
                self.input_mode = false;
            }
            KeyCode::Esc => {
                self.input_mode = false;
                self.suggestions.clear();
            }
            KeyCode::Tab => self.complete(),
            KeyCode::Backspace => {
                self.input.pop();
                self.update_suggestions();
            }
            KeyCode::Char(c) => {
                self.input.push(c);
                self.update_suggestions();
            }
            _ => {}
        }
    }

    fn apply_filter(&mut self) {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            self.filter = Filter::default();
        } else {
            self.filter = parse_filter(&text);
            if self.filter.is_valid() && history::remember(&mut self.filter_history, &text) {
                history::save_history(&self.filter_history);
            }
        }
        self.suggestions.clear();
        self.scroll = 0;
        self.refresh_data();
    }

    fn update_suggestions(&mut self) {
        let seen = collect_seen_values(&self.flows);
        self.suggestions =
            flowscope_filter::suggest::suggestions(&self.input, &self.filter_history, &seen);
        self.suggestion_idx = 0;
    }

    /// Tab cycles through the candidates, replacing the input each time.
    fn complete(&mut self) {
        if self.suggestions.is_empty() {
            self.update_suggestions();
        }
        // The first entry is the input itself; skip straight to the
        // alternatives.
        if self.suggestions.len() > 1 {
            self.suggestion_idx = (self.suggestion_idx + 1) % self.suggestions.len();
            if self.suggestion_idx == 0 {
                self.suggestion_idx = 1;
            }
            self.input = self.suggestions[self.suggestion_idx].clone();
        }
    }

    fn toggle_sort(&mut self, field: SortField) {
        if self.sort_field == field {
            self.sort_asc = !self.sort_asc;
        } else {
            self.sort_field = field;
            self.sort_asc = false;
        }
        self.refresh_data();
    }

    fn scroll_down(&mut self, by: usize) {
        let max = self.row_count().saturating_sub(1);
        self.scroll = (self.scroll + by).min(max);
    }

    fn row_count(&self) -> usize {
        if self.biflow {
            self.conversations.len()
        } else {
            self.flows.len()
        }
    }
}

/// Launches the TUI and blocks until the user quits.
pub fn run(store: Arc<FlowStore>, refresh: Duration) -> Result<()> {
    let mut app = TuiApp::new(store, refresh);
    app.run()
}

/// Harvests distinct services/ports/IPs/interfaces from the current
/// snapshot for value autocompletion.
pub(crate) fn collect_seen_values(flows: &[Flow]) -> SeenValues {
    let mut services = BTreeSet::new();
    let mut ports = BTreeSet::new();
    let mut ips = BTreeSet::new();
    let mut interfaces = BTreeSet::new();

    for flow in flows {
        if let Some(service) = flowscope_resolver::service_name(flow.dst_port, flow.protocol)
            .or_else(|| flowscope_resolver::service_name(flow.src_port, flow.protocol))
        {
            services.insert(service.to_string());
        }
        ports.insert(flow.src_port.to_string());
        ports.insert(flow.dst_port.to_string());
        ips.insert(flow.src_addr.to_string());
        ips.insert(flow.dst_addr.to_string());
        if flow.input_if > 0 {
            interfaces.insert(flow.input_if.to_string());
        }
        if flow.output_if > 0 {
            interfaces.insert(flow.output_if.to_string());
        }
    }

    SeenValues {
        services: services.into_iter().collect(),
        ports: ports.into_iter().collect(),
        ips: ips.into_iter().collect(),
        interfaces: interfaces.into_iter().collect(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use flowscope_types::FlowVersion;

    #[test]
    fn test_collect_seen_values() {
        let flow = Flow {
            version: FlowVersion::V5,
            src_addr: "10.0.0.1".parse().unwrap(),
            dst_addr: "8.8.8.8".parse().unwrap(),
            src_port: 50000,
            dst_port: 53,
            protocol: 17,
            input_if: 1,
            output_if: 3,
            ..Default::default()
        };
        let seen = collect_seen_values(&[flow]);
        assert!(seen.services.contains(&"dns".to_string()));
        assert!(seen.ports.contains(&"53".to_string()));
        assert!(seen.ips.contains(&"10.0.0.1".to_string()));
        assert_eq!(seen.interfaces, vec!["1".to_string(), "3".to_string()]);
    }
}
