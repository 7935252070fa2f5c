use super::TuiApp;
use flowscope_types::{Conversation, Flow};
use flowscope_utils::scale::{format_count, format_decimal, scale_byte_rate, scale_bytes};
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::net::IpAddr;

pub(super) fn draw(frame: &mut Frame, app: &TuiApp) {
    if app.show_help {
        draw_help(frame);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.size());

    draw_stats(frame, chunks[0], app);
    draw_filter(frame, chunks[1], app);
    if app.biflow {
        draw_conversations(frame, chunks[2], app);
    } else {
        draw_flows(frame, chunks[2], app);
    }
    draw_footer(frame, chunks[3], app);
}

fn draw_stats(frame: &mut Frame, area: Rect, app: &TuiApp) {
    let stats = app.store.stats();
    let flow_count = app.store.flow_count();
    let max_flows = app.store.max_flows();
    let eviction = app.store.eviction_stats();

    let mem_style = if flow_count >= max_flows {
        Style::default().fg(Color::Red)
    } else if flow_count > max_flows * 8 / 10 {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::White)
    };

    let mut line1 = vec![
        Span::styled("Flows: ", Style::default().fg(Color::Yellow)),
        Span::raw(format_count(stats.total_flows)),
        Span::styled("  Mem: ", Style::default().fg(Color::Yellow)),
        Span::styled(
            format!(
                "{}/{}",
                format_count(flow_count as u64),
                format_count(max_flows as u64)
            ),
            mem_style,
        ),
        Span::styled("  Rate: ", Style::default().fg(Color::Yellow)),
        Span::raw(format!("{}/s", format_decimal(stats.flows_per_second, 1))),
        Span::styled("  Throughput: ", Style::default().fg(Color::Yellow)),
        Span::raw(scale_byte_rate(stats.bytes_per_second as u64)),
    ];
    if eviction.total_evicted > 0 {
        line1.push(Span::styled("  Evicted: ", Style::default().fg(Color::Yellow)));
        line1.push(Span::raw(format!(
            "{} (TopK:{} LRU:{})",
            format_count(eviction.total_evicted),
            eviction.top_k_protected,
            eviction.lru_protected
        )));
    }
    if app.paused {
        line1.push(Span::styled(
            "  [PAUSED]",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }

    let filtered = app.store.filtered_stats(if app.filter.is_empty() {
        None
    } else {
        Some(&app.filter)
    });
    let line2 = vec![
        Span::styled("Versions: ", Style::default().fg(Color::Yellow)),
        Span::raw(format!(
            "v5:{} v9:{} IPFIX:{}",
            stats.v5_flows, stats.v9_flows, stats.ipfix_flows
        )),
        Span::styled("  Exporters: ", Style::default().fg(Color::Yellow)),
        Span::raw(stats.unique_exporters.to_string()),
        Span::styled("  Showing: ", Style::default().fg(Color::Yellow)),
        Span::raw(format!(
            "{} ({}, {} pkts)",
            format_count(filtered.count as u64),
            scale_bytes(filtered.bytes),
            format_count(filtered.packets)
        )),
    ];

    let block = Block::default().borders(Borders::BOTTOM);
    let paragraph =
        Paragraph::new(vec![Line::from(line1), Line::from(line2)]).block(block);
    frame.render_widget(paragraph, area);
}

fn draw_filter(frame: &mut Frame, area: Rect, app: &TuiApp) {
    let (label, label_style) = if app.filter.to_string().is_empty() {
        (" Filter: ".to_string(), Style::default().fg(Color::White))
    } else if !app.filter.is_valid() {
        (" Filter [ERR]: ".to_string(), Style::default().fg(Color::Red))
    } else {
        let matches = app.store.filtered_count(Some(&app.filter));
        (
            format!(" Filter [{}]: ", format_count(matches as u64)),
            Style::default().fg(Color::Green),
        )
    };

    // Show the live input while editing, the applied filter otherwise.
    let text = if app.input_mode {
        app.input.clone()
    } else {
        app.filter.to_string()
    };

    let mut spans = vec![Span::styled(label, label_style), Span::raw(text)];
    if app.input_mode {
        spans.push(Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)));
        if let Some(suggestion) = app.suggestions.get(1) {
            spans.push(Span::styled(
                format!("  ({suggestion})"),
                Style::default().fg(Color::DarkGray),
            ));
        }
    } else if let Some(error) = app.filter.error() {
        spans.push(Span::styled(
            format!("  {error}"),
            Style::default().fg(Color::Red),
        ));
    }

    let title = if app.input_mode {
        " Filter (Enter=Apply, Esc=Cancel, Tab=Complete) "
    } else {
        " Filter (f=edit, c=clear) "
    };
    let block = Block::default().borders(Borders::ALL).title(title);
    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn draw_flows(frame: &mut Frame, area: Rect, app: &TuiApp) {
    let header = Row::new(vec![
        "Time", "Src", "Dst", "Proto", "Service", "Bytes", "Packets", "Flags",
    ])
    .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

    let visible = area.height.saturating_sub(2) as usize;
    let rows: Vec<Row> = app
        .flows
        .iter()
        .skip(app.scroll)
        .take(visible)
        .map(|flow| flow_row(flow, app))
        .collect();

    let title = format!(
        " Flows ({}) sort={}{} {}",
        app.flows.len(),
        app.sort_field,
        if app.sort_asc { " ASC" } else { " DESC" },
        if app.aggregate { "[aggregated] " } else { "" },
    );
    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(24),
            Constraint::Length(24),
            Constraint::Length(6),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(8),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(table, area);
}

fn flow_row<'a>(flow: &Flow, app: &TuiApp) -> Row<'a> {
    let service = flowscope_resolver::service_name(flow.dst_port, flow.protocol)
        .or_else(|| flowscope_resolver::service_name(flow.src_port, flow.protocol))
        .unwrap_or("");

    Row::new(vec![
        flow.received_at.format("%H:%M:%S").to_string(),
        format!("{}:{}", display_addr(flow.src_addr, app), flow.src_port),
        format!("{}:{}", display_addr(flow.dst_addr, app), flow.dst_port),
        flow.protocol_name(),
        if app.show_service {
            service.to_string()
        } else {
            String::new()
        },
        scale_bytes(flow.bytes),
        format_count(flow.packets),
        flow.tcp_flags_string(),
    ])
}

fn draw_conversations(frame: &mut Frame, area: Rect, app: &TuiApp) {
    let header = Row::new(vec![
        "A", "B", "Proto", "A→B", "B→A", "Total", "Flows", "Bi",
    ])
    .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

    let visible = area.height.saturating_sub(2) as usize;
    let rows: Vec<Row> = app
        .conversations
        .iter()
        .skip(app.scroll)
        .take(visible)
        .map(|conv| conversation_row(conv, app))
        .collect();

    let title = format!(
        " Conversations ({}) sort={}{} ",
        app.conversations.len(),
        app.sort_field,
        if app.sort_asc { " ASC" } else { " DESC" },
    );
    let table = Table::new(
        rows,
        [
            Constraint::Length(24),
            Constraint::Length(24),
            Constraint::Length(6),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(7),
            Constraint::Length(3),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(table, area);
}

fn conversation_row<'a>(conv: &Conversation, app: &TuiApp) -> Row<'a> {
    Row::new(vec![
        format!("{}:{}", display_addr(conv.addr_a, app), conv.port_a),
        format!("{}:{}", display_addr(conv.addr_b, app), conv.port_b),
        conv.protocol_name(),
        scale_bytes(conv.bytes_a_to_b),
        scale_bytes(conv.bytes_b_to_a),
        scale_bytes(conv.total_bytes()),
        format_count(conv.flows_a_to_b + conv.flows_b_to_a),
        if conv.is_bidirectional() { "<>" } else { ">" }.to_string(),
    ])
}

fn display_addr(addr: IpAddr, app: &TuiApp) -> String {
    if app.resolve_dns {
        flowscope_resolver::resolve_hostname(addr)
    } else {
        addr.to_string()
    }
}

fn draw_footer(frame: &mut Frame, area: Rect, app: &TuiApp) {
    let text = format!(
        "q=quit f=filter c=clear 1-6=sort r=rev a=agg:{} b=biflow:{} e=svc:{} n=dns:{} space=pause ?=help",
        on_off(app.aggregate),
        on_off(app.biflow),
        on_off(app.show_service),
        on_off(app.resolve_dns),
    );
    frame.render_widget(
        Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
        area,
    );
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn draw_help(frame: &mut Frame) {
    let text = "\
FlowScope - Keyboard Shortcuts

Navigation:
  Up/Down, j/k    Scroll through flows
  PgUp/PgDn       Page up/down
  Home/End        Jump to start/end

Sorting:
  1-6             Sort by Src/Dst/Proto/Bytes/Pkts/Time
  r               Reverse sort order (ASC/DESC)

Filtering:
  f or /          Focus filter input
  Tab             Complete suggestion
  Enter           Apply filter
  Esc             Cancel editing
  c               Clear filter

Filter Syntax:
  src=192.168     Source IP contains
  dst=10.0        Dest IP contains
  ip=8.8          Either src or dst
  src=10.0.0.0/8  CIDR match
  port:443        Either port
  proto=tcp       Protocol
  service=https   Service name

Filter Operators:
  && or space     AND
  ||              OR
  ! or not        NOT (prefix)
  ( )             Grouping

Display:
  a               Toggle flow aggregation
  b               Toggle conversation (biflow) view
  e               Toggle service names
  n               Toggle DNS resolution
  Space           Pause/Resume
  ?               This help
  q               Quit

Press any key to close";

    let block = Block::default().borders(Borders::ALL).title(" Help ");
    frame.render_widget(Paragraph::new(text).block(block), frame.size());
}
