use crate::extract::Row;
use crate::model::Team;

/// Relocated franchises the source still links under their old code.
pub fn canonical_abbreviation(raw: &str) -> &str {
    match raw {
        "NOH" => "NOP",
        "CHA" => "CHO",
        "NJN" => "BRK",
        other => other,
    }
}

/// `/teams/NJN/` or `/teams/NJN/2012.html` -> `BRK`.
pub fn abbreviation_from_href(href: &str) -> Option<String> {
    let code = href.split('/').nth(2)?.trim_end_matches(".html").trim();
    if code.is_empty() {
        return None;
    }
    Some(canonical_abbreviation(code).to_string())
}

/// Franchise metadata from one row of the active-franchise index.
pub fn team_from_index_row(row: &Row) -> Option<Team> {
    let abbreviation = abbreviation_from_href(row.href("franch_name")?)?;
    Some(Team {
        abbreviation,
        name: row.text("franch_name").to_string(),
        logo_url: String::new(),
        win_loss_pct: row.percent("win_loss_pct"),
        playoffs: row.count("years_playoffs"),
        division_titles: row.count("years_division_champion"),
        conference_titles: row.count("years_conference_champion"),
        championships: row.count("years_league_champion"),
    })
}
