/// Terminal color depth, 0 (none) to 3 (truecolor), from the usual variables.
pub fn detect_color_level() -> u8 {
    color_level_from(
        |name| std::env::var(name).ok(),
        atty::is(atty::Stream::Stderr),
    )
}

pub fn color_level_from(var: impl Fn(&str) -> Option<String>, is_tty: bool) -> u8 {
    if var("NO_COLOR").is_some() {
        return 0;
    }
    if let Some(forced) = var("FORCE_COLOR") {
        return match forced.trim() {
            "0" | "false" => 0,
            "2" => 2,
            "3" => 3,
            _ => 1,
        };
    }
    if !is_tty {
        return 0;
    }
    let colorterm = var("COLORTERM").unwrap_or_default();
    if colorterm == "truecolor" || colorterm == "24bit" {
        return 3;
    }
    match var("TERM") {
        Some(term) if term == "dumb" => 0,
        Some(term) if term.contains("256") => 2,
        _ => 1,
    }
}
