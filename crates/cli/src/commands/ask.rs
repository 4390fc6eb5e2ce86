//! `medquery ask` and `medquery fast` — resolve a question from the terminal.

use medquery_agent::{FastLookup, ResponseFrame};
use medquery_core::response::{Note, Response};
use std::io::Write;

use super::load_config;

pub async fn run(query: &str, stream: bool, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let router = medquery_agent::build_router(&config).await?;

    if stream {
        let mut rx = router.resolve_stream(query)?;
        let mut stdout = std::io::stdout();
        while let Some(frame) = rx.recv().await {
            match frame {
                ResponseFrame::Metadata {
                    route,
                    confidence,
                    confidence_level,
                    cached,
                    ..
                } => {
                    eprintln!(
                        "  [{}{}] confiance {} ({:.2})",
                        route.path,
                        if cached { ", cache" } else { "" },
                        confidence_level,
                        confidence
                    );
                }
                ResponseFrame::Content { text } => {
                    write!(stdout, "{text}")?;
                    stdout.flush()?;
                }
                ResponseFrame::Done { trace_id } => {
                    println!();
                    eprintln!("  trace: {trace_id}");
                }
            }
        }
        return Ok(());
    }

    let response = router.resolve(query).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", render(&response));
    }
    Ok(())
}

pub async fn fast(query: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let router = medquery_agent::build_router(&config).await?;

    match router.fast_lookup(query).await? {
        FastLookup::Resolved(response) => print!("{}", render(&response)),
        FastLookup::Unresolved => {
            println!("Aucune réponse directe pour cette question.");
            println!("Essayez `medquery ask` pour passer par l'agent.");
        }
    }
    Ok(())
}

/// Human-readable rendering: answer, note, then a one-line footer.
pub fn render(response: &Response) -> String {
    let mut out = String::new();
    out.push_str(&response.answer);
    out.push('\n');

    if let Some(note) = &response.note {
        out.push_str(&render_note(note));
    }

    let route = match &response.route.pattern {
        Some(pattern) => format!("{} ({pattern})", response.route.path),
        None => response.route.path.to_string(),
    };
    out.push_str(&format!(
        "\n— {route}, confiance {} ({:.2}){}{}, trace {}\n",
        response.confidence_level,
        response.confidence,
        if response.cached { ", cache" } else { "" },
        if response.degraded { ", dégradée" } else { "" },
        response.trace_id()
    ));
    out
}

fn render_note(note: &Note) -> String {
    let mut out = format!("\nNote: {}\n", note.message);
    for candidate in &note.candidates {
        out.push_str(&format!("  • {} ({}%)\n", candidate.name, candidate.score));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use medquery_agent::{Confidence, TraceBuilder};
    use medquery_core::response::{Candidate, RouteDecision};
    use medquery_core::trace::ConfidenceLevel;

    fn response(route: RouteDecision, note: Option<Note>) -> Response {
        Response {
            success: true,
            answer: "**Doliprane 1000mg**".into(),
            confidence: 0.95,
            confidence_level: ConfidenceLevel::High,
            route,
            tool_calls: Vec::new(),
            note,
            degraded: false,
            cached: true,
            trace: TraceBuilder::new().finalize(Confidence::new(0.95), true),
        }
    }

    #[test]
    fn footer_names_route_confidence_and_trace() {
        let response = response(RouteDecision::fast_path("bare_drug_name"), None);
        let text = render(&response);
        assert!(text.starts_with("**Doliprane 1000mg**\n"));
        assert!(text.contains("fast_path (bare_drug_name)"));
        assert!(text.contains("(0.95)"));
        assert!(text.contains(", cache"));
        assert!(text.trim_end().ends_with(&format!("trace {}", response.trace_id())));
    }

    #[test]
    fn note_lists_candidates() {
        let note = Note::new("Plusieurs médicaments correspondent").with_candidates(vec![
            Candidate {
                name: "doliprane".into(),
                score: 82,
            },
            Candidate {
                name: "dafalgan".into(),
                score: 80,
            },
        ]);
        let text = render(&response(RouteDecision::agent(), Some(note)));
        assert!(text.contains("Note: Plusieurs médicaments correspondent"));
        assert!(text.contains("• doliprane (82%)"));
        assert!(text.contains("• dafalgan (80%)"));
    }
}
