//! Email notices
//!
//! Builders only; sending goes through [`crate::MarketContext::notify`].
//! Every interpolated value is HTML-escaped in the html body.

use market_core::notify::EmailMessage;
use market_core::{Listing, MarketSettings, PickupCredential};
use rust_decimal::Decimal;

const DEFAULT_SUPPORT_EMAIL: &str = "support@showroommarket.com";

/// Escape text for interpolation into HTML
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn support_address(settings: &MarketSettings) -> &str {
    settings.support_email.as_deref().unwrap_or(DEFAULT_SUPPORT_EMAIL)
}

fn pickup_window(listing: &Listing) -> String {
    match (listing.pickup_window_start.as_deref(), listing.pickup_window_end.as_deref()) {
        (Some(start), Some(end)) => format!("{start} to {end}"),
        (Some(start), None) => format!("from {start}"),
        (None, Some(end)) => format!("until {end}"),
        (None, None) => "Contact the seller to arrange a time".into(),
    }
}

/// Render label/value rows as text lines and an html list
fn render_rows(rows: &[(&str, String)]) -> (String, String) {
    let text = rows
        .iter()
        .map(|(label, value)| format!("{label}: {value}"))
        .collect::<Vec<_>>()
        .join("\n");
    let html = rows
        .iter()
        .map(|(label, value)| format!("<li><strong>{}:</strong> {}</li>", escape_html(label), escape_html(value)))
        .collect::<String>();
    (text, format!("<ul>{html}</ul>"))
}

/// Pickup instructions for the buyer, with the credential as QR image and text
pub fn pickup_instructions(
    settings: &MarketSettings,
    listing: &Listing,
    credential: &PickupCredential,
) -> Option<EmailMessage> {
    let to = listing.buyer_email.clone()?;
    let title = listing.display_title();
    let payload = credential.payload();
    let support = support_address(settings);

    let rows = [
        ("Listing", title.to_string()),
        ("Seller", listing.seller_name.clone().unwrap_or_else(|| "Showroom seller".into())),
        (
            "Pickup Address",
            listing.pickup_address.clone().unwrap_or_else(|| "(see seller)".into()),
        ),
        ("Pickup Window", pickup_window(listing)),
    ];
    let (row_text, row_html) = render_rows(&rows);

    let text = format!(
        "Your purchase is confirmed.\n\n{row_text}\n\nShow this code at pickup:\nQR payload: {payload}\n\nQuestions? {support}"
    );
    let html = format!(
        "<p>Your purchase is confirmed.</p>{row_html}\
         <p>Show this code at pickup:</p>\
         <p><img src=\"{qr}\" alt=\"Pickup QR code\" width=\"320\" height=\"320\"></p>\
         <p>If the image does not load, give the desk this code:<br><code>{payload}</code></p>\
         <p>Questions? {support}</p>",
        qr = escape_html(&credential.qr_image_url()),
        payload = escape_html(&payload),
        support = escape_html(support),
    );

    Some(EmailMessage::new(
        to,
        format!("Pickup Instructions — {title} (Showroom Market)"),
        html,
        text,
    ))
}

/// Tell the seller their item sold and is awaiting pickup
pub fn item_sold(settings: &MarketSettings, listing: &Listing) -> Option<EmailMessage> {
    let to = listing.seller_email.clone()?;
    let title = listing.display_title();

    let mut rows = vec![("Listing", title.to_string())];
    if let Some(amount) = listing.seller_payout_amount {
        rows.push(("Your payout", format_amount(amount, &settings.currency)));
    }
    rows.push(("Pickup Window", pickup_window(listing)));
    let (row_text, row_html) = render_rows(&rows);

    let note = "The buyer will bring a pickup code. Your payout is released after pickup is confirmed and the hold period ends.";
    Some(EmailMessage::new(
        to,
        format!("Sold — {title} (Showroom Market)"),
        format!("<p>Your item sold.</p>{row_html}<p>{}</p>", escape_html(note)),
        format!("Your item sold.\n\n{row_text}\n\n{note}"),
    ))
}

/// Tell the seller their payout was sent
pub fn payout_sent(
    settings: &MarketSettings,
    listing: &Listing,
    amount: Decimal,
    transfer_id: &str,
) -> Option<EmailMessage> {
    let to = listing.seller_email.clone()?;
    let title = listing.display_title();

    let rows = [
        ("Listing", title.to_string()),
        ("Amount", format_amount(amount, &settings.currency)),
        ("Transfer", transfer_id.to_string()),
    ];
    let (row_text, row_html) = render_rows(&rows);

    Some(EmailMessage::new(
        to,
        format!("Payout Sent — {title} (Showroom Market)"),
        format!("<p>Your payout is on its way.</p>{row_html}"),
        format!("Your payout is on its way.\n\n{row_text}"),
    ))
}

/// Tell the seller a dispute was resolved and their payout reinstated
pub fn dispute_resolved(settings: &MarketSettings, listing: &Listing) -> Option<EmailMessage> {
    let to = listing.seller_email.clone()?;
    let title = listing.display_title();
    let support = support_address(settings);

    let body = format!(
        "The payment dispute for {title} has been resolved. Your payout is re-enabled and will be processed automatically. Questions? {support}"
    );
    Some(EmailMessage::new(
        to,
        "Dispute Resolved — Payout Reinstated",
        format!("<p>{}</p>", escape_html(&body)),
        body,
    ))
}

/// Operator alert; `None` when no operator address is configured
pub fn operator_alert(settings: &MarketSettings, subject: &str, details: &[(&str, String)]) -> Option<EmailMessage> {
    let to = settings.operator_email.clone()?;
    let (row_text, row_html) = render_rows(details);

    Some(EmailMessage::new(
        to,
        format!("[Showroom Market] {subject}"),
        format!("<p>{}</p>{row_html}", escape_html(subject)),
        format!("{subject}\n\n{row_text}"),
    ))
}

fn format_amount(amount: Decimal, currency: &str) -> String {
    format!("{} {}", amount.round_dp(2), currency.to_uppercase())
}
