use crate::ast::{ConditionNode, ExprNode, Field};
use crate::token::{tokenize, Token};
use crate::Filter;
use ip_network::IpNetwork;
use std::net::IpAddr;

/// Protocol names accepted by `proto=` conditions and as bare identifiers.
pub(crate) const KNOWN_PROTOCOLS: [&str; 8] =
    ["tcp", "udp", "icmp", "gre", "esp", "ah", "icmpv6", "sctp"];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<String>,
}

impl Parser {
    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// OR has the lowest precedence.
    fn parse_expr(&mut self) -> Option<ExprNode> {
        let left = self.parse_and_expr()?;
        let mut children = vec![left];

        while matches!(self.current(), Some(Token::Or)) {
            self.advance();
            match self.parse_and_expr() {
                Some(right) => children.push(right),
                None => {
                    self.errors.push("expected expression after ||".to_string());
                    break;
                }
            }
        }

        if children.len() == 1 {
            children.pop()
        } else {
            Some(ExprNode::Or(children))
        }
    }

    /// AND binds tighter than OR. Juxtaposition of two primaries is an
    /// implicit AND.
    fn parse_and_expr(&mut self) -> Option<ExprNode> {
        let left = self.parse_unary_expr()?;
        let mut children = vec![left];

        loop {
            if matches!(self.current(), Some(Token::And)) {
                self.advance();
                match self.parse_unary_expr() {
                    Some(right) => children.push(right),
                    None => {
                        self.errors.push("expected expression after &&".to_string());
                        break;
                    }
                }
                continue;
            }

            // Juxtaposition: another primary directly after this one.
            if matches!(
                self.current(),
                Some(Token::Condition(_)) | Some(Token::LParen) | Some(Token::Not)
            ) {
                match self.parse_unary_expr() {
                    Some(right) => children.push(right),
                    None => break,
                }
                continue;
            }

            break;
        }

        if children.len() == 1 {
            children.pop()
        } else {
            Some(ExprNode::And(children))
        }
    }

    fn parse_unary_expr(&mut self) -> Option<ExprNode> {
        if matches!(self.current(), Some(Token::Not)) {
            self.advance();
            return match self.parse_unary_expr() {
                Some(child) => Some(ExprNode::Not(Box::new(child))),
                None => {
                    self.errors.push("expected expression after !".to_string());
                    None
                }
            };
        }
        self.parse_primary_expr()
    }

    fn parse_primary_expr(&mut self) -> Option<ExprNode> {
        match self.current().cloned() {
            Some(Token::LParen) => {
                self.advance();
                let expr = self.parse_expr();
                match expr {
                    None => {
                        self.errors.push("expected expression after (".to_string());
                        None
                    }
                    Some(expr) => {
                        if matches!(self.current(), Some(Token::RParen)) {
                            self.advance();
                        } else {
                            self.errors.push("missing closing )".to_string());
                        }
                        Some(expr)
                    }
                }
            }
            Some(Token::Condition(text)) => {
                self.advance();
                self.parse_condition(&text)
            }
            _ => None,
        }
    }

    /// Splits one condition token into field, operator, and value, and
    /// validates the value against the field's domain.
    fn parse_condition(&mut self, s: &str) -> Option<ExprNode> {
        let (key, value, negated) = match s.find("!=").filter(|idx| *idx > 0) {
            Some(idx) => (
                s[..idx].to_ascii_lowercase(),
                s[idx + 2..].to_string(),
                true,
            ),
            None => {
                let idx = s.find('=').or_else(|| s.find(':'));
                match idx {
                    Some(idx) if idx > 0 => (
                        s[..idx].to_ascii_lowercase(),
                        s[idx + 1..].to_string(),
                        false,
                    ),
                    _ => {
                        // No operator: accept a few well-known bare
                        // identifiers, reject everything else.
                        let lower = s.to_ascii_lowercase();
                        if lower == "self" || lower == "local" {
                            ("self".to_string(), "true".to_string(), false)
                        } else if KNOWN_PROTOCOLS.contains(&lower.as_str()) {
                            ("proto".to_string(), lower, false)
                        } else if flowscope_resolver::is_known_service(&lower) {
                            ("service".to_string(), lower, false)
                        } else {
                            self.errors.push(format!("{s} (invalid syntax)"));
                            return None;
                        }
                    }
                }
            }
        };

        let Some(field) = Field::from_name(&key) else {
            self.errors.push(format!("{s} (unknown field)"));
            return None;
        };

        if value.is_empty() {
            self.errors.push(format!("{s} (empty value)"));
            return None;
        }

        let mut cond = ConditionNode {
            field,
            value: value.clone(),
            port: 0,
            interface: 0,
            network: None,
            negated,
        };

        if field.is_ip_field() && value.contains('/') {
            match parse_cidr(&value) {
                Some(network) => cond.network = Some(network),
                None => {
                    self.errors.push(format!("{s} (invalid CIDR)"));
                    return None;
                }
            }
        }

        if field.is_port_field() {
            match value.parse::<u16>() {
                Ok(port) => cond.port = port,
                Err(_) => {
                    self.errors.push(format!("{s} (invalid port)"));
                    return None;
                }
            }
        }

        if field.is_interface_field() {
            match value.parse::<u16>() {
                Ok(interface) => cond.interface = interface,
                Err(_) => {
                    self.errors.push(format!("{s} (invalid interface)"));
                    return None;
                }
            }
        }

        if field == Field::Proto && !KNOWN_PROTOCOLS.contains(&value.to_ascii_lowercase().as_str())
        {
            self.errors.push(format!("{s} (unknown protocol)"));
            return None;
        }

        Some(ExprNode::Condition(cond))
    }
}

fn parse_cidr(value: &str) -> Option<IpNetwork> {
    let (addr, prefix) = value.split_once('/')?;
    let addr: IpAddr = addr.parse().ok()?;
    let prefix: u8 = prefix.parse().ok()?;
    IpNetwork::new_truncate(addr, prefix).ok()
}

/// Parses a filter string. Never fails: a string with errors yields a
/// filter that reports them, keeps no expression tree, and matches
/// everything.
pub fn parse_filter(input: &str) -> Filter {
    let raw = input.trim().to_string();
    if raw.is_empty() {
        return Filter::default();
    }

    let tokens = tokenize(&raw);
    let mut parser = Parser {
        tokens,
        pos: 0,
        errors: Vec::new(),
    };

    let root = parser.parse_expr();

    if parser.pos < parser.tokens.len() {
        parser
            .errors
            .push(format!("unexpected: {}", parser.tokens[parser.pos].text()));
    }

    if parser.errors.is_empty() {
        Filter::new(root, raw, None)
    } else {
        // Don't evaluate a partial parse.
        let error = format!("invalid: {}", parser.errors.join(", "));
        Filter::new(None, raw, Some(error))
    }
}
