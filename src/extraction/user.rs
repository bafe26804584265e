use super::{block_text, csrf_token, definition_pairs, first, is_not_found_page};
use super::listing::parse_user_listing_total;
use super::work::subscription_id;
use crate::define_selector;
use crate::errors::Ao3ApiError;
use crate::types::UserProfile;
use crate::utils::{element_text, page_count, parse_count, safe_static_selector};
use scraper::Html;

define_selector!(META_SELECTOR, META_SELECTOR_TEXT, "dl.meta");
define_selector!(BIO_SELECTOR, BIO_SELECTOR_TEXT, "div.bio blockquote.userstuff");
define_selector!(AVATAR_SELECTOR, AVATAR_SELECTOR_TEXT, "div.icon img");

/// Parses `/users/{username}/profile`. Listing counts are left at zero.
pub fn parse_profile(body: &str, username: &str) -> Result<UserProfile, Ao3ApiError> {
    let document = Html::parse_document(body);
    let root = document.root_element();
    if is_not_found_page(root)? {
        return Err(Ao3ApiError::InvalidId(format!("cannot find user {username}")));
    }

    let mut profile = UserProfile {
        username: username.to_string(),
        authenticity_token: csrf_token(root)?,
        subscription_id: subscription_id(root)?,
        ..UserProfile::default()
    };

    if let Some(dl) = first(root, safe_static_selector(&META_SELECTOR, META_SELECTOR_TEXT)?) {
        for (label, value) in definition_pairs(dl) {
            let value = element_text(value);
            if label.contains("joined") {
                profile.joined = Some(value);
            } else if label.contains("user id") {
                profile.user_id = parse_count(&value);
            }
        }
    }
    if let Some(bio) = first(root, safe_static_selector(&BIO_SELECTOR, BIO_SELECTOR_TEXT)?) {
        profile.bio = Some(block_text(bio)?).filter(|s| !s.is_empty());
    }
    profile.avatar_url = first(root, safe_static_selector(&AVATAR_SELECTOR, AVATAR_SELECTOR_TEXT)?)
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string);
    Ok(profile)
}

/// Total entries and page count of a user's works or bookmarks listing.
pub fn parse_listing_totals(body: &str) -> Result<(u64, u32), Ao3ApiError> {
    let total = parse_user_listing_total(body)?;
    let pages = page_count(&Html::parse_document(body))?;
    Ok((total, pages))
}
