use crate::diary::DiaryRow;
use crate::frontmatter::FrontMatter;

// Column aliases, checked in order.
pub const TITLE_COLUMNS: [&str; 8] = [
    "Name", "name", "Title", "title", "Film", "film", "Movie", "movie",
];
pub const DATE_COLUMNS: [&str; 3] = ["Watched Date", "Date", "date"];
pub const YEAR_COLUMNS: [&str; 2] = ["Year", "year"];

pub const RATING_COLUMN: &str = "Rating";
pub const REVIEW_COLUMN: &str = "Review";
pub const CONTENT_COLUMN: &str = "content";

pub const WATCHES_KEY: &str = "watches";
pub const POSTER_KEY: &str = "poster";
pub const TAGS_KEY: &str = "tags";

pub const WATCH_HISTORY_HEADING: &str = "## Watch History";

#[derive(Debug, Clone)]
pub struct Viewing {
    pub title: String,
    pub year: Option<String>,
    pub watched_date: Option<String>,
    pub rating: Option<String>,
    pub review: Option<String>,
}

impl Viewing {
    pub fn from_row(row: &DiaryRow) -> Option<Self> {
        let title = row.first_non_empty(&TITLE_COLUMNS)?;
        Some(Self {
            title: title.to_string(),
            year: row.first_non_empty(&YEAR_COLUMNS).map(str::to_string),
            watched_date: row.first_non_empty(&DATE_COLUMNS).map(str::to_string),
            rating: non_empty(row.get(RATING_COLUMN)),
            review: non_empty(row.get(REVIEW_COLUMN)),
        })
    }
}

pub fn build_front_matter(
    row: &DiaryRow,
    poster_url: Option<&str>,
    watches: u64,
    tags: &[String],
) -> FrontMatter {
    let mut front = FrontMatter::new();
    for (name, value) in row.fields() {
        if value.is_empty() {
            continue;
        }
        front.set_string(name, value);
    }
    if let Some(url) = poster_url
        && !url.is_empty()
    {
        front.set_string(POSTER_KEY, url);
    }
    front.set_u64(WATCHES_KEY, watches);
    if !tags.is_empty() {
        front.set_string_list(TAGS_KEY, tags);
    }
    front
}

pub fn synthesize(
    row: &DiaryRow,
    viewing: &Viewing,
    poster_url: Option<&str>,
    tags: &[String],
) -> String {
    let front = build_front_matter(row, poster_url, 1, tags);

    let mut document = front.render();
    document.push('\n');
    if let Some(content) = row.get(CONTENT_COLUMN)
        && !content.is_empty()
    {
        document.push_str(content);
        document.push_str("\n\n");
    }
    document.push_str(WATCH_HISTORY_HEADING);
    document.push_str("\n\n");
    document.push_str(&watch_entry(viewing));
    document
}

pub fn watch_entry(viewing: &Viewing) -> String {
    let mut entry = format!("### {}\n", viewing.watched_date.as_deref().unwrap_or(""));
    if let Some(rating) = &viewing.rating {
        entry.push_str(&format!("**Rating:** {rating}\n"));
    }
    if let Some(review) = &viewing.review {
        entry.push_str(&format!("**Review:** {review}\n"));
    }
    entry.push('\n');
    entry
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}
