use crate::catalogue;

/// `chlog plugins`
pub fn execute(full_names: bool) -> anyhow::Result<()> {
    let sources = catalogue::sources(!full_names)?;
    let renderers = catalogue::renderers(!full_names);

    let label = |name: &str| if full_names { name.to_string() } else { name.to_lowercase() };

    let mut out = String::new();
    out.push_str("Sources:\n");
    for (name, plugin) in sources.iter() {
        out.push_str(&format!("  {:<20} {}\n", label(name), plugin.description()));
    }
    out.push_str("\nRenderers:\n");
    for (name, plugin) in renderers.iter() {
        out.push_str(&format!("  {:<20} {}\n", label(name), plugin.description()));
    }

    let failures: Vec<&(String, String)> =
        sources.failures().iter().chain(renderers.failures()).collect();
    if !failures.is_empty() {
        out.push_str("\nUnavailable:\n");
        for (name, reason) in failures {
            out.push_str(&format!("  {:<20} {reason}\n", label(name)));
        }
    }
    print!("{out}");
    Ok(())
}
