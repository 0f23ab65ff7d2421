use crate::model::ContentKind;
use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::{json, Value};

const ANILIST_URL: &str = "https://graphql.anilist.co";
const OMDB_URL: &str = "https://www.omdbapi.com/";
const TVMAZE_URL: &str = "https://api.tvmaze.com";

/// How many unfiltered TVMaze shows to keep, best-rated first.
const TV_BROWSE_LIMIT: usize = 24;

const MANGA_SEARCH_QUERY: &str = r#"
query ($page: Int, $perPage: Int, $search: String, $sort: [MediaSort]) {
  Page(page: $page, perPage: $perPage) {
    media(type: MANGA, search: $search, isAdult: false, sort: $sort) {
      id
      title { romaji english }
      coverImage { large medium }
    }
  }
}"#;

const MANGA_DETAIL_QUERY: &str = r#"
query ($id: Int) {
  Media(id: $id, type: MANGA) {
    id
    title { romaji english }
    description(asHtml: false)
    coverImage { large }
    genres
    averageScore
    status
  }
}"#;

/// One catalog hit, normalized across the three sources.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    pub cover: String,
    pub kind: ContentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

#[derive(Debug, Serialize, Default, PartialEq)]
pub struct CatalogResults {
    pub manga: Vec<MediaItem>,
    pub films: Vec<MediaItem>,
    pub tv_shows: Vec<MediaItem>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ShowDetail {
    pub id: String,
    pub title: String,
    pub description: String,
    pub cover: String,
    pub premiered: Option<String>,
    pub rating: Option<f64>,
    pub genres: Vec<String>,
    pub status: Option<String>,
    pub network: Option<String>,
}

/// Fan out to all three sources in parallel. A failing source contributes an
/// empty list rather than failing the whole call.
pub async fn fetch_all(
    client: &reqwest::Client,
    omdb_key: Option<&str>,
    search: &str,
) -> CatalogResults {
    let (manga, films, tv_shows) = tokio::join!(
        fetch_manga(client, search, TV_BROWSE_LIMIT),
        fetch_films(client, omdb_key, search),
        fetch_tv_shows(client, search),
    );
    combine(manga, films, tv_shows)
}

/// Merge per-source outcomes, isolating failures to their own source.
pub fn combine(
    manga: Result<Vec<MediaItem>>,
    films: Result<Vec<MediaItem>>,
    tv_shows: Result<Vec<MediaItem>>,
) -> CatalogResults {
    CatalogResults {
        manga: manga.unwrap_or_default(),
        films: films.unwrap_or_default(),
        tv_shows: tv_shows.unwrap_or_default(),
    }
}

pub async fn fetch_manga(
    client: &reqwest::Client,
    search: &str,
    per_page: usize,
) -> Result<Vec<MediaItem>> {
    let mut variables = json!({ "page": 1, "perPage": per_page });
    if search.is_empty() {
        variables["sort"] = json!(["POPULARITY_DESC"]);
    } else {
        variables["search"] = json!(search);
    }
    let body: Value = client
        .post(ANILIST_URL)
        .json(&json!({ "query": MANGA_SEARCH_QUERY, "variables": variables }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    if body.get("errors").is_some() {
        return Err(anyhow!("anilist_error"));
    }
    Ok(parse_anilist_page(&body))
}

pub async fn fetch_films(
    client: &reqwest::Client,
    omdb_key: Option<&str>,
    search: &str,
) -> Result<Vec<MediaItem>> {
    // OMDb has no browse endpoint and needs a key for everything
    let Some(key) = omdb_key else {
        return Ok(Vec::new());
    };
    if search.is_empty() {
        return Ok(Vec::new());
    }
    let body: Value = client
        .get(OMDB_URL)
        .query(&[("apikey", key), ("s", search), ("type", "movie")])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(parse_omdb_search(&body))
}

pub async fn fetch_tv_shows(client: &reqwest::Client, search: &str) -> Result<Vec<MediaItem>> {
    let body: Value = if search.is_empty() {
        client
            .get(format!("{TVMAZE_URL}/shows"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?
    } else {
        client
            .get(format!("{TVMAZE_URL}/search/shows"))
            .query(&[("q", search)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?
    };
    Ok(parse_tvmaze_shows(&body, !search.is_empty()))
}

/// Raw OMDb search response, for the proxy endpoint.
pub async fn film_search_raw(client: &reqwest::Client, key: &str, search: &str) -> Result<Value> {
    let body = client
        .get(OMDB_URL)
        .query(&[("apikey", key), ("s", search), ("type", "movie")])
        .send()
        .await?
        .json()
        .await?;
    Ok(body)
}

/// Raw OMDb detail response for one imdb id, for the proxy endpoint.
pub async fn film_detail_raw(client: &reqwest::Client, key: &str, imdb_id: &str) -> Result<Value> {
    let body = client
        .get(OMDB_URL)
        .query(&[("apikey", key), ("i", imdb_id), ("plot", "full")])
        .send()
        .await?
        .json()
        .await?;
    Ok(body)
}

/// AniList manga detail, passed through as the Media object.
pub async fn manga_detail(client: &reqwest::Client, id: i64) -> Result<Value> {
    let body: Value = client
        .post(ANILIST_URL)
        .json(&json!({ "query": MANGA_DETAIL_QUERY, "variables": { "id": id } }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let media = body["data"]["Media"].clone();
    if media.is_null() {
        return Err(anyhow!("not_found"));
    }
    Ok(media)
}

pub async fn tv_show_detail(client: &reqwest::Client, id: &str) -> Result<ShowDetail> {
    let resp = client.get(format!("{TVMAZE_URL}/shows/{id}")).send().await?;
    if !resp.status().is_success() {
        return Err(anyhow!("not_found"));
    }
    let show: Value = resp.json().await?;
    Ok(parse_tvmaze_detail(&show))
}

fn parse_anilist_page(body: &Value) -> Vec<MediaItem> {
    let media = body["data"]["Page"]["media"].as_array();
    media
        .map(|items| items.iter().filter_map(parse_anilist_media).collect())
        .unwrap_or_default()
}

fn parse_anilist_media(item: &Value) -> Option<MediaItem> {
    let id = item["id"].as_i64()?;
    let title = item["title"]["english"]
        .as_str()
        .or_else(|| item["title"]["romaji"].as_str())?
        .to_string();
    let cover = item["coverImage"]["large"]
        .as_str()
        .or_else(|| item["coverImage"]["medium"].as_str())
        .unwrap_or_default()
        .to_string();
    Some(MediaItem {
        id: id.to_string(),
        title,
        cover,
        kind: ContentKind::Manga,
        year: None,
        rating: None,
    })
}

fn parse_omdb_search(body: &Value) -> Vec<MediaItem> {
    if body["Response"].as_str() == Some("False") {
        return Vec::new();
    }
    let Some(hits) = body["Search"].as_array() else {
        return Vec::new();
    };
    hits.iter()
        .filter_map(|movie| {
            let id = movie["imdbID"].as_str()?;
            let title = movie["Title"].as_str()?;
            let poster = movie["Poster"].as_str().filter(|p| *p != "N/A");
            Some(MediaItem {
                id: id.to_string(),
                title: title.to_string(),
                cover: poster.unwrap_or_default().to_string(),
                kind: ContentKind::Film,
                year: None,
                rating: None,
            })
        })
        .collect()
}

fn parse_tvmaze_shows(body: &Value, searched: bool) -> Vec<MediaItem> {
    let Some(entries) = body.as_array() else {
        return Vec::new();
    };
    let mut shows: Vec<&Value> = entries
        .iter()
        .map(|e| if searched { &e["show"] } else { e })
        .collect();
    shows.sort_by(|a, b| {
        let ra = a["rating"]["average"].as_f64().unwrap_or(0.0);
        let rb = b["rating"]["average"].as_f64().unwrap_or(0.0);
        rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
    });
    shows
        .into_iter()
        .take(TV_BROWSE_LIMIT)
        .filter_map(|show| {
            let id = show["id"].as_i64()?;
            let title = show["name"].as_str()?;
            let cover = show["image"]["medium"]
                .as_str()
                .or_else(|| show["image"]["original"].as_str())
                .unwrap_or_default();
            Some(MediaItem {
                id: id.to_string(),
                title: title.to_string(),
                cover: cover.to_string(),
                kind: ContentKind::TvShow,
                year: premiere_year(show),
                rating: show["rating"]["average"].as_f64(),
            })
        })
        .collect()
}

fn parse_tvmaze_detail(show: &Value) -> ShowDetail {
    let network = show["network"]["name"]
        .as_str()
        .or_else(|| show["webChannel"]["name"].as_str())
        .map(Into::into);
    ShowDetail {
        id: show["id"].as_i64().unwrap_or_default().to_string(),
        title: show["name"].as_str().unwrap_or_default().to_string(),
        description: show["summary"]
            .as_str()
            .map(strip_html)
            .unwrap_or_else(|| "No description available.".into()),
        cover: show["image"]["original"]
            .as_str()
            .or_else(|| show["image"]["medium"].as_str())
            .unwrap_or_default()
            .to_string(),
        premiered: show["premiered"].as_str().map(Into::into),
        rating: show["rating"]["average"].as_f64(),
        genres: show["genres"]
            .as_array()
            .map(|g| {
                g.iter()
                    .filter_map(|v| v.as_str().map(Into::into))
                    .collect()
            })
            .unwrap_or_default(),
        status: show["status"].as_str().map(Into::into),
        network,
    }
}

fn premiere_year(show: &Value) -> Option<i32> {
    show["premiered"].as_str()?.get(..4)?.parse().ok()
}

/// Drop HTML tags from TVMaze summaries.
fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
