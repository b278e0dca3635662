//! Keyword tagging of stream titles and descriptions.

use crate::snapshot::StreamRecord;

pub const UNARCHIVED: &str = "Unarchived";

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub name: String,
    /// Lowercase keywords, matched as substrings.
    pub keywords: Vec<String>,
    pub icon: String,
    pub color: String,
    /// Badge markup shown next to a matching title.
    pub label_markup: String,
}

impl Filter {
    pub fn new(name: &str, keywords: &[&str], icon: &str, color: &str, label_markup: &str) -> Self {
        Self {
            name: name.into(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            icon: icon.into(),
            color: color.into(),
            label_markup: label_markup.into(),
        }
    }

    pub fn badge(&self) -> &str {
        &self.label_markup
    }

    /// First keyword found in either the title or the description.
    pub fn first_match(&self, record: &StreamRecord) -> Option<&str> {
        let title = record.title.to_lowercase();
        let description = record
            .description
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_default();

        self.keywords
            .iter()
            .find(|k| title.contains(k.as_str()) || description.contains(k.as_str()))
            .map(String::as_str)
    }
}

pub fn default_filters() -> Vec<Filter> {
    vec![
        Filter::new(
            UNARCHIVED,
            &["unarchive", "unarchived", "no archive", "no archived"],
            "🚨",
            "palevioletred",
            r#"<span style="font-weight: bold; background-color: palevioletred; padding: 1.5px; margin: 4px; border-style: dashed;">UNARCHIVED</span>"#,
        ),
        Filter::new(
            "Karaoke",
            &["karaoke", "sing", "singing", "歌枠", "ヒトカラ", "カラ"],
            "🎤",
            "burlywood",
            r#"<span style="font-weight: bold; background-color: burlywood; padding: 1.5px; margin: 4px; border-style: dashed;">Karaoke</span>"#,
        ),
        Filter::new(
            "Liar's Bar",
            &["liar's bar", "liars bar", "liar bar"],
            "🤥",
            "#2F131E",
            r#"<span style="font-weight: bold; background-color: #2F131E; padding: 3px; margin: 4px; border-radius: 30%; color: #87F5FB;">Liar</span>"#,
        ),
    ]
}

/// Filters a single record tripped, in filter order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub matched: Vec<usize>,
}

impl Classification {
    pub fn is(&self, filter_index: usize) -> bool {
        self.matched.contains(&filter_index)
    }
}

pub struct Classifier {
    filters: Vec<Filter>,
}

impl Classifier {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.filters.iter().position(|f| f.name == name)
    }

    pub fn classify(&self, record: &StreamRecord) -> Classification {
        Classification {
            matched: self
                .filters
                .iter()
                .enumerate()
                .filter(|(_, f)| f.first_match(record).is_some())
                .map(|(i, _)| i)
                .collect(),
        }
    }

    pub fn is_unarchived(&self, classification: &Classification) -> bool {
        self.index_of(UNARCHIVED)
            .map(|i| classification.is(i))
            .unwrap_or(false)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_filters())
    }
}

/// Running per-filter totals across a digest.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterTotals {
    counts: Vec<usize>,
}

impl FilterTotals {
    pub fn new(classifier: &Classifier) -> Self {
        Self {
            counts: vec![0; classifier.filters().len()],
        }
    }

    pub fn add(&mut self, classification: &Classification) {
        for &i in &classification.matched {
            if let Some(c) = self.counts.get_mut(i) {
                *c += 1;
            }
        }
    }

    pub fn get(&self, filter_index: usize) -> usize {
        self.counts.get(filter_index).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::tests::record;

    #[test]
    fn case_insensitive_match() {
        let classifier = Classifier::default();
        let rec = record("UCa", "1", "【UNARCHIVED】 chatting");
        let c = classifier.classify(&rec);
        assert!(classifier.is_unarchived(&c));
        assert_eq!(c.matched, vec![0]);
    }

    #[test]
    fn description_counts() {
        let classifier = Classifier::default();
        let mut rec = record("UCa", "1", "Friday stream");
        rec.description = Some("Playing Liars Bar with friends".into());
        let c = classifier.classify(&rec);
        assert_eq!(c.matched, vec![2]);
    }

    #[test]
    fn one_hit_per_record() {
        let classifier = Classifier::default();
        let mut rec = record("UCa", "1", "karaoke karaoke 歌枠");
        rec.description = Some("singing karaoke".into());

        let mut totals = FilterTotals::new(&classifier);
        totals.add(&classifier.classify(&rec));
        assert_eq!(totals.get(1), 1);
        assert_eq!(totals.get(0), 0);
    }

    #[test]
    fn badges_keep_their_own_style() {
        let filters = default_filters();
        assert!(filters[0].badge().contains("border-style: dashed"));
        assert!(filters[0].badge().ends_with(">UNARCHIVED</span>"));

        let liar = filters[2].badge();
        assert!(liar.contains("background-color: #2F131E"));
        assert!(liar.contains("border-radius: 30%"));
        assert!(liar.contains("color: #87F5FB"));
        assert!(!liar.contains("dashed"));
    }

    #[test]
    fn first_keyword_wins() {
        let filter = &default_filters()[0];
        let rec = record("UCa", "1", "no archived, unarchived");
        assert_eq!(filter.first_match(&rec), Some("unarchive"));
    }

    #[test]
    fn no_match() {
        let classifier = Classifier::default();
        let c = classifier.classify(&record("UCa", "1", "Minecraft"));
        assert!(c.matched.is_empty());
        assert!(!classifier.is_unarchived(&c));
    }
}
