pub mod config;
pub mod diary;
pub mod frontmatter;
pub mod import;
pub mod library;
pub mod merge;
pub mod note;
pub mod tmdb;
