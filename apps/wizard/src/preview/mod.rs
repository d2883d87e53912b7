pub mod projector;

pub use projector::{project, PreviewItem, PreviewModel, PreviewOverlay, PreviewSection};

/// Renders a projected preview as a markdown document, one heading per section.
pub fn render_markdown(preview: &PreviewModel) -> String {
    let mut md = String::new();
    match &preview.header.full_name {
        Some(name) => md.push_str(&format!("# {name}\n\n")),
        None => md.push_str("# Untitled CV\n\n"),
    }
    if let Some(title) = &preview.header.title {
        md.push_str(&format!("**{title}**\n\n"));
    }
    if !preview.header.contact.is_empty() {
        md.push_str(&preview.header.contact.join(" | "));
        md.push_str("\n\n");
    }
    if let Some(summary) = &preview.summary {
        md.push_str("## Professional Summary\n\n");
        md.push_str(summary);
        md.push_str("\n\n");
    }
    for section in &preview.sections {
        md.push_str(&format!("## {}\n\n", section.heading));
        for item in &section.items {
            let mut line = String::from("###");
            if let Some(title) = &item.title {
                line.push_str(&format!(" {title}"));
            }
            if let Some(subtitle) = &item.subtitle {
                line.push_str(&format!(" | {subtitle}"));
            }
            md.push_str(line.trim_end());
            md.push('\n');
            if let Some(dates) = &item.dates {
                md.push_str(&format!("*{dates}*\n"));
            }
            for detail in &item.details {
                md.push_str(&format!("- {detail}\n"));
            }
            md.push('\n');
        }
    }
    md.push_str(&format!("---\nTemplate: {}", preview.template_name));
    if let Some(pct) = preview.completion_percentage {
        md.push_str(&format!(" · {pct}% complete"));
    }
    md.push('\n');
    md
}
