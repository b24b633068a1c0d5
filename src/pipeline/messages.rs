// src/pipeline/messages.rs

//! Chat-facing message texts (Telegram HTML).

use std::time::Duration;

use chrono::{DateTime, Local, Utc};

use crate::models::{NewsItem, Stats};
use crate::pipeline::watch::CycleOutcome;
use crate::storage::StoreSummary;
use crate::utils::{escape_html, format_countdown, format_duration, format_timestamp};

const NEWS_TEMPLATE: &str = "🔔 <b>Nuova notizia USR Lombardia!</b>\n\n📰 <b>{title}</b>\n\n🔗 {url}";

const COMMAND_LIST: &str = "🔔 <b>/start</b> - Iscriviti alle notifiche\n\
    ❌ <b>/stop</b> - Cancella l'iscrizione\n\
    📰 <b>/last</b> - Ultima notizia registrata\n\
    ⏰ <b>/next</b> - Tempo al prossimo controllo\n\
    🚀 <b>/force</b> - Controlla subito\n\
    📊 <b>/stats</b> - Statistiche del bot\n\
    ❓ <b>/help</b> - Questo messaggio";

fn minutes(interval: Duration) -> u64 {
    interval.as_secs() / 60
}

/// Notification sent to every subscriber for a new item.
pub fn news_notification(item: &NewsItem, now: DateTime<Local>) -> String {
    let escaped = NewsItem {
        title: escape_html(&item.title),
        url: escape_html(&item.url),
        date: item.date,
    };
    let mut text = escaped.format(NEWS_TEMPLATE);
    if item.date.is_some() {
        text.push_str(&escaped.format("\n📅 Pubblicata il {date}"));
    }
    text.push_str(&format!(
        "\n\n⏰ <i>{}</i>",
        now.format("%d/%m/%Y alle %H:%M")
    ));
    text
}

pub fn welcome(subscriber_count: usize, interval: Duration) -> String {
    format!(
        "🎉 <b>Benvenuto nel MiM Watcher!</b>\n\n\
         📢 Riceverai una notifica per ogni nuova notizia pubblicata su USR Lombardia.\n\n\
         👥 <b>Iscritti totali:</b> {subscriber_count}\n\
         🔄 Controllo ogni {} minuti\n\n\
         📝 Usa /help per vedere tutti i comandi",
        minutes(interval)
    )
}

pub fn already_subscribed(subscriber_count: usize, interval: Duration) -> String {
    format!(
        "✅ Sei già iscritto alle notifiche!\n\n\
         👥 Iscritti totali: {subscriber_count}\n\
         🔄 Controllo ogni {} minuti\n\
         📝 Usa /help per vedere tutti i comandi",
        minutes(interval)
    )
}

pub fn goodbye(remaining: usize) -> String {
    format!(
        "👋 <b>Iscrizione cancellata!</b>\n\n\
         ❌ Non riceverai più notifiche.\n\
         👥 Iscritti rimasti: {remaining}\n\n\
         🔄 Puoi iscriverti di nuovo con /start"
    )
}

pub fn not_subscribed() -> String {
    "ℹ️ Non risulti iscritto alle notifiche.\n\n📝 Usa /start per iscriverti".to_string()
}

pub fn help(subscriber_count: usize, interval: Duration) -> String {
    format!(
        "📖 <b>Comandi disponibili:</b>\n\n{COMMAND_LIST}\n\n\
         🤖 Il bot controlla la pagina USR Lombardia ogni {} minuti \
         e ti avvisa appena compare una nuova notizia.\n\n\
         👥 <b>Iscritti attivi:</b> {subscriber_count}",
        minutes(interval)
    )
}

pub fn stats(
    stats: &Stats,
    summary: &StoreSummary,
    interval: Duration,
    now: DateTime<Utc>,
) -> String {
    let uptime = (now - stats.started_at).num_seconds().max(0) as u64;
    let or_never =
        |at: Option<DateTime<Utc>>| at.map_or_else(|| "mai".to_string(), format_timestamp);

    let mut text = format!(
        "📊 <b>Statistiche MiM Watcher</b>\n\n\
         🚀 <b>Avviato:</b> {}\n\
         ⏰ <b>Uptime:</b> {}\n\
         👥 <b>Iscritti:</b> {}\n\
         🔎 <b>Controlli eseguiti:</b> {}\n\
         📰 <b>Notifiche inviate:</b> {}\n\
         ⌨️ <b>Comandi processati:</b> {}\n\
         🕐 <b>Ultimo controllo:</b> {}\n\
         🆕 <b>Ultima notizia:</b> {}\n\
         📄 <b>Notizie memorizzate:</b> {}\n\
         🔄 <b>Intervallo controlli:</b> {} minuti",
        format_timestamp(stats.started_at),
        format_duration(uptime),
        summary.subscriber_count,
        stats.total_checks,
        stats.total_news_sent,
        stats.total_commands_processed,
        or_never(stats.last_check_at),
        or_never(stats.last_news_at),
        summary.seen_count,
        minutes(interval),
    );
    if let (Some(at), Some(error)) = (stats.last_error_at, &stats.last_error) {
        text.push_str(&format!(
            "\n⚠️ <b>Ultimo errore:</b> {} ({})",
            escape_html(error),
            format_timestamp(at)
        ));
    }
    text
}

/// `/last` reply: the latest recorded news, else the last seen identifier.
pub fn last_item(latest: Option<&NewsItem>, last_seen: Option<&str>) -> String {
    match (latest, last_seen) {
        (Some(item), _) => format!(
            "📰 <b>Ultima notizia:</b>\n\n<b>{}</b>\n\n🔗 {}",
            escape_html(&item.title),
            escape_html(&item.url)
        ),
        (None, Some(key)) => format!(
            "📰 <b>Ultima notizia registrata:</b>\n\n🔗 {}",
            escape_html(key)
        ),
        (None, None) => "ℹ️ Nessuna notizia registrata finora.".to_string(),
    }
}

/// `/next` reply. `remaining` is `None` when the check is due now.
pub fn next_check(
    remaining: Option<Duration>,
    last_check: Option<DateTime<Utc>>,
    interval: Duration,
) -> String {
    let Some(remaining) = remaining else {
        return "⏰ <b>Prossimo controllo imminente!</b>\n\n\
                🔄 Il controllo automatico partirà a momenti."
            .to_string();
    };

    let last = last_check.map_or_else(|| "mai".to_string(), format_timestamp);
    format!(
        "⏱️ <b>Prossimo controllo automatico:</b> tra {}\n\n\
         📅 Ultimo controllo: {}\n\
         🔄 Intervallo: ogni {} minuti\n\n\
         💡 Usa /force per controllare subito",
        format_countdown(remaining.as_secs()),
        last,
        minutes(interval)
    )
}

pub fn force_started() -> String {
    "🚀 Controllo forzato in corso...".to_string()
}

pub fn force_outcome(outcome: &CycleOutcome) -> String {
    match outcome {
        CycleOutcome::FetchFailed(_) => {
            "⚠️ Impossibile raggiungere la pagina in questo momento. Riprova più tardi.".to_string()
        }
        CycleOutcome::NoItems => {
            "ℹ️ Controllo completato: nessuna notizia trovata sulla pagina.".to_string()
        }
        CycleOutcome::Completed(report) if report.new_items == 0 => {
            "✅ <b>Controllo completato!</b>\n\nNessuna novità.".to_string()
        }
        CycleOutcome::Completed(report) => format!(
            "✅ <b>Controllo completato!</b>\n\n\
             🆕 Nuove notizie: {}\n📨 Notifiche inviate: {}",
            report.new_items, report.sent
        ),
    }
}

pub fn unknown(text: &str) -> String {
    format!(
        "❓ Comando non riconosciuto: <code>{}</code>\n\n\
         📝 Usa /help per vedere tutti i comandi disponibili",
        escape_html(text)
    )
}

pub fn internal_error() -> String {
    "⚠️ Si è verificato un errore interno. Riprova più tardi.".to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::pipeline::watch::CycleReport;

    #[test]
    fn test_news_notification_escapes() {
        let item = NewsItem::new("Esami <sessione> & date", "https://example.gov.it/a?x=1&y=2");
        let now = Local.with_ymd_and_hms(2025, 5, 6, 9, 30, 0).unwrap();
        let text = news_notification(&item, now);

        assert!(text.contains("<b>Esami &lt;sessione&gt; &amp; date</b>"));
        assert!(text.contains("https://example.gov.it/a?x=1&amp;y=2"));
        assert!(text.contains("06/05/2025 alle 09:30"));
        assert!(!text.contains("Pubblicata il"));
    }

    #[test]
    fn test_news_notification_with_date() {
        let item = NewsItem::new("Calendario scolastico regionale", "https://example.gov.it/c")
            .with_date(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        let text = news_notification(&item, Local::now());
        assert!(text.contains("Pubblicata il 01/06/2025"));
    }

    #[test]
    fn test_last_item() {
        assert!(last_item(None, None).contains("Nessuna notizia"));

        let key = "https://example.gov.it/a";
        assert!(last_item(None, Some(key)).contains(key));

        let item = NewsItem::new("Nomine in ruolo <docenti>", "https://example.gov.it/b");
        let text = last_item(Some(&item), Some(key));
        assert!(text.contains("<b>Nomine in ruolo &lt;docenti&gt;</b>"));
        assert!(text.contains("https://example.gov.it/b"));
        assert!(!text.contains(key));
    }

    #[test]
    fn test_news_notification_keeps_braces_in_title() {
        let item = NewsItem::new("Modello {url} da compilare", "https://example.gov.it/m");
        let text = news_notification(&item, Local::now());
        assert!(text.contains("<b>Modello {url} da compilare</b>"));
    }

    #[test]
    fn test_next_check_imminent_without_history() {
        let text = next_check(None, None, Duration::from_secs(1800));
        assert!(text.contains("imminente"));
    }

    #[test]
    fn test_next_check_countdown() {
        let text = next_check(Some(Duration::from_secs(125)), None, Duration::from_secs(1800));
        assert!(text.contains("tra 2m 5s"));
        assert!(text.contains("Ultimo controllo: mai"));
    }

    #[test]
    fn test_force_outcome() {
        let report = CycleReport {
            extracted: 3,
            new_items: 2,
            sent: 4,
            failed: 0,
        };
        let text = force_outcome(&CycleOutcome::Completed(report));
        assert!(text.contains("Nuove notizie: 2"));
        assert!(text.contains("Notifiche inviate: 4"));
    }

    #[test]
    fn test_unknown_escapes() {
        assert!(unknown("<script>").contains("&lt;script&gt;"));
    }
}
