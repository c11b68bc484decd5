use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Source-specific codes (schedule feeds, odds feeds, historical abbreviations)
/// folded onto the MLB-standard code.
static TEAM_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("WSN", "WSH"),
        ("WAS", "WSH"),
        ("CHW", "CWS"),
        ("TBR", "TB"),
        ("KCR", "KC"),
        ("SDP", "SD"),
        ("SFG", "SF"),
        ("AZ", "ARI"),
        ("ATH", "OAK"),
    ])
});

/// Teams whose park key in the ballpark document differs from their code.
static PARK_ALIASES: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| HashMap::from([("ARI", "AZ"), ("CWS", "CHW"), ("OAK", "ATH")]));

static TEAM_NAME_TO_ABBR: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("Arizona Diamondbacks", "ARI"),
        ("Atlanta Braves", "ATL"),
        ("Baltimore Orioles", "BAL"),
        ("Boston Red Sox", "BOS"),
        ("Chicago Cubs", "CHC"),
        ("Chicago White Sox", "CWS"),
        ("Cincinnati Reds", "CIN"),
        ("Cleveland Guardians", "CLE"),
        ("Colorado Rockies", "COL"),
        ("Detroit Tigers", "DET"),
        ("Houston Astros", "HOU"),
        ("Kansas City Royals", "KC"),
        ("Los Angeles Angels", "LAA"),
        ("Los Angeles Dodgers", "LAD"),
        ("Miami Marlins", "MIA"),
        ("Milwaukee Brewers", "MIL"),
        ("Minnesota Twins", "MIN"),
        ("New York Mets", "NYM"),
        ("New York Yankees", "NYY"),
        ("Oakland Athletics", "OAK"),
        ("Athletics", "OAK"),
        ("Philadelphia Phillies", "PHI"),
        ("Pittsburgh Pirates", "PIT"),
        ("San Diego Padres", "SD"),
        ("Seattle Mariners", "SEA"),
        ("San Francisco Giants", "SF"),
        ("St. Louis Cardinals", "STL"),
        ("Tampa Bay Rays", "TB"),
        ("Texas Rangers", "TEX"),
        ("Toronto Blue Jays", "TOR"),
        ("Washington Nationals", "WSH"),
    ])
});

const NAME_SUFFIXES: [&str; 6] = ["jr", "sr", "ii", "iii", "iv", "v"];

/// Canonical team code, or `None` for blank input.
pub fn canonical_team(raw: &str) -> Option<String> {
    let upper = raw.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return None;
    }
    let code = TEAM_ALIASES
        .get(upper.as_str())
        .map(|code| code.to_string())
        .unwrap_or(upper);
    Some(code)
}

pub fn team_from_full_name(name: &str) -> Option<String> {
    TEAM_NAME_TO_ABBR
        .get(name.trim())
        .and_then(|abbr| canonical_team(abbr))
}

pub fn park_key(team: &str) -> String {
    format!("{team}_park")
}

/// Secondary park key for shared or renamed venues.
pub fn park_alias_key(team: &str) -> Option<String> {
    PARK_ALIASES.get(team).map(|alias| park_key(alias))
}

/// Fallback join key for player and pitcher names: ASCII-folded, lowercase,
/// generational suffixes and punctuation removed, whitespace collapsed.
pub fn name_key(raw: &str) -> String {
    let mut folded = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match fold_char(ch) {
            Some(rep) => folded.push_str(rep),
            None if ch.is_ascii() => folded.push(ch.to_ascii_lowercase()),
            None => {}
        }
    }

    // Drop suffix words first so "Jr." and "Jr" both disappear before the
    // punctuation pass glues anything together.
    let mut without_suffix = String::with_capacity(folded.len());
    let mut word = String::new();
    for ch in folded.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            word.push(ch);
            continue;
        }
        flush_word(&mut without_suffix, &mut word);
        without_suffix.push(ch);
    }
    flush_word(&mut without_suffix, &mut word);

    let mut out = String::with_capacity(without_suffix.len());
    let mut pending_space = false;
    for ch in without_suffix.chars() {
        if ch.is_ascii_whitespace() {
            pending_space = !out.is_empty();
        } else if ch.is_ascii_alphanumeric() {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(ch);
        }
    }
    out
}

fn flush_word(out: &mut String, word: &mut String) {
    if !word.is_empty() && !NAME_SUFFIXES.contains(&word.as_str()) {
        out.push_str(word);
    }
    word.clear();
}

fn fold_char(ch: char) -> Option<&'static str> {
    let rep = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => "a",
        'ç' | 'ć' | 'č' | 'Ç' | 'Ć' | 'Č' => "c",
        'ď' | 'Ď' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ė' | 'Ę' | 'Ě' => "e",
        'ğ' | 'Ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' | 'Į' | 'İ' => "i",
        'ł' | 'ľ' | 'Ł' | 'Ľ' => "l",
        'ñ' | 'ń' | 'ň' | 'Ñ' | 'Ń' | 'Ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ő' => "o",
        'ř' | 'Ř' => "r",
        'ś' | 'š' | 'ş' | 'Ś' | 'Š' | 'Ş' => "s",
        'ß' => "ss",
        'ť' | 'ţ' | 'Ť' | 'Ţ' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => "u",
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' | 'Ű' | 'Ų' => "u",
        'ý' | 'ÿ' | 'Ý' | 'Ÿ' => "y",
        'ź' | 'ż' | 'ž' | 'Ź' | 'Ż' | 'Ž' => "z",
        _ => return None,
    };
    Some(rep)
}

/// Two-tier name lookup: exact name first, then the folded `name_key`.
#[derive(Debug, Clone)]
pub struct NameIndex<T> {
    items: Vec<T>,
    exact: HashMap<String, usize>,
    folded: HashMap<String, usize>,
}

impl<T> Default for NameIndex<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            exact: HashMap::new(),
            folded: HashMap::new(),
        }
    }
}

impl<T> NameIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry for `name`. The folded key keeps the
    /// first name that produced it.
    pub fn insert(&mut self, name: &str, item: T) {
        if let Some(&idx) = self.exact.get(name) {
            self.items[idx] = item;
            return;
        }
        let idx = self.items.len();
        self.items.push(item);
        self.exact.insert(name.to_string(), idx);
        let key = name_key(name);
        if !key.is_empty() {
            self.folded.entry(key).or_insert(idx);
        }
    }

    pub fn get_exact(&self, name: &str) -> Option<&T> {
        self.exact.get(name).map(|&idx| &self.items[idx])
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        if let Some(item) = self.get_exact(name) {
            return Some(item);
        }
        let key = name_key(name);
        if key.is_empty() {
            return None;
        }
        self.folded.get(&key).map(|&idx| &self.items[idx])
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_codes_fold_to_standard() {
        assert_eq!(canonical_team("wsn").as_deref(), Some("WSH"));
        assert_eq!(canonical_team("CHW").as_deref(), Some("CWS"));
        assert_eq!(canonical_team("AZ").as_deref(), Some("ARI"));
        assert_eq!(canonical_team("ATH").as_deref(), Some("OAK"));
        assert_eq!(canonical_team("NYY").as_deref(), Some("NYY"));
        assert_eq!(canonical_team("  "), None);
    }

    #[test]
    fn full_names_map_to_codes() {
        assert_eq!(team_from_full_name("Chicago White Sox").as_deref(), Some("CWS"));
        assert_eq!(team_from_full_name("Nowhere Nine"), None);
    }

    #[test]
    fn park_alias_covers_shared_codes() {
        assert_eq!(park_alias_key("ARI").as_deref(), Some("AZ_park"));
        assert_eq!(park_alias_key("NYY"), None);
    }

    #[test]
    fn name_key_strips_accents_suffixes_and_punctuation() {
        assert_eq!(name_key("Ronald Acuña Jr."), "ronald acuna");
        assert_eq!(name_key("Vladimir Guerrero Jr"), "vladimir guerrero");
        assert_eq!(name_key("Ken Griffey III"), "ken griffey");
        assert_eq!(name_key("Travis d'Arnaud"), "travis darnaud");
        assert_eq!(name_key("  J.D.   Martinez "), "jd martinez");
        assert_eq!(name_key("Randy Vásquez"), "randy vasquez");
    }

    #[test]
    fn name_index_prefers_exact_then_folded() {
        let mut idx = NameIndex::new();
        idx.insert("José Ramírez", 1);
        idx.insert("Jose Ramirez Jr.", 2);
        assert_eq!(idx.get("José Ramírez"), Some(&1));
        assert_eq!(idx.get("Jose Ramirez Jr."), Some(&2));
        assert_eq!(idx.get("jose ramirez"), Some(&1));
        assert_eq!(idx.get("Nobody"), None);
    }
}
