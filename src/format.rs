//! HTML message rendering for Telegram (`ParseMode::Html`).
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde_json::json;

use crate::config::App;
use crate::model::{parse_upstream_date, DomainEvent, FeedbackStatus, RawRecord};
use crate::wb::{ApiProbe, EndpointStatus};

const DISPLAY_DATE: &str = "%d.%m.%Y %H:%M";
const DISPLAY_DATETIME: &str = "%d.%m.%Y %H:%M:%S";
const MISSING: &str = "нет данных";
const TEST_MARKER: &str = "<i>Это тестовое уведомление.</i>";

/// Escapes the three characters Telegram's HTML mode cares about.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

fn field(record: &RawRecord, key: &str) -> String {
    record
        .text(key)
        .map(|v| escape_html(&v))
        .unwrap_or_else(|| MISSING.to_string())
}

fn field_or(record: &RawRecord, key: &str, default: &str) -> String {
    record
        .text(key)
        .map(|v| escape_html(&v))
        .unwrap_or_else(|| default.to_string())
}

fn display_date(raw: Option<String>) -> String {
    let parsed = match raw {
        Some(raw) => parse_upstream_date(&raw),
        None => Utc::now().naive_utc(),
    };
    parsed.format(DISPLAY_DATE).to_string()
}

/// Seller-portal time (UTC+3).
pub fn moscow_now() -> DateTime<FixedOffset> {
    let msk = FixedOffset::east_opt(3 * 3600).unwrap_or_else(|| Utc.fix());
    Utc::now().with_timezone(&msk)
}

pub fn order_message(order: &RawRecord) -> String {
    format!(
        "🛍 <b>Новый заказ!</b>\n\n\
         📝 Артикул: {}\n\
         💳 Заплатил покупатель: {} ₽\n\
         💵 Цена продажи: {} ₽\n\
         📍 Регион: {} обл., {}\n\
         🏪 Склад: {} ({})\n\
         📅 Дата: {}",
        field(order, "supplierArticle"),
        field(order, "finishedPrice"),
        field(order, "priceWithDisc"),
        field(order, "regionName"),
        field(order, "oblastOkrugName"),
        field(order, "warehouseName"),
        field(order, "warehouseType"),
        display_date(order.text("date")),
    )
}

pub fn sale_message(sale: &RawRecord) -> String {
    let date = sale.text("date").or_else(|| sale.change_date());
    format!(
        "💰 <b>Новый выкуп!</b>\n\n\
         📝 Артикул: {}\n\
         💵 Цена продажи: {} ₽\n\
         🧮 Комиссия: {} ₽\n\
         💸 К выплате: {} ₽\n\
         📍 Регион: {}\n\
         📅 Дата: {}",
        field(sale, "supplierArticle"),
        field_or(sale, "finishedPrice", "0"),
        field_or(sale, "feeWB", "0"),
        field_or(sale, "forPay", "0"),
        field_or(sale, "regionName", "Не указан"),
        display_date(date),
    )
}

pub fn event_message(event: &DomainEvent) -> String {
    match event {
        DomainEvent::Order(r) => order_message(r),
        DomainEvent::Sale(r) => sale_message(r),
    }
}

/// `None` unless at least one flag is set.
pub fn feedback_message(status: &FeedbackStatus) -> Option<String> {
    if !status.has_news() {
        return None;
    }
    let mut msg = String::from("❗️ <b>Пришел новый отзыв или вопрос!</b>\n\nПроверьте портал продавца.");
    if status.feedbacks_count > 0 || status.questions_count > 0 {
        msg.push_str(&format!(
            "\n\nБез ответа: отзывов {}, вопросов {}",
            status.feedbacks_count, status.questions_count
        ));
    }
    Some(msg)
}

pub fn startup_message(app: &App, started_at: DateTime<FixedOffset>) -> String {
    format!(
        "🟢 <b>Мониторинг запущен</b>\n\n\
         ⏱ Время запуска: {}\n\
         🔄 Интервал проверки данных: {} минут\n\
         ⭐️ Интервал проверки отзывов: {} сек\n\
         ℹ️ Данные будут проверяться автоматически и вы получите уведомление только о новых событиях.",
        started_at.format(DISPLAY_DATETIME),
        app.orders_interval_secs / 60,
        app.feedback_interval_secs,
    )
}

fn endpoint_line(name: &str, status: &EndpointStatus) -> String {
    if status.ok {
        return format!(
            "✅ <b>{name}:</b> Работает\n⏱ Время ответа: {:.2} сек\n",
            status.elapsed.as_secs_f64()
        );
    }
    let detail = match (&status.error, status.code) {
        (Some(err), _) => format!("⚠️ Ошибка: {}", escape_html(err)),
        (None, Some(code)) => format!("⚠️ Код ответа: {code}"),
        (None, None) => "⚠️ Нет ответа".to_string(),
    };
    format!("❌ <b>{name}:</b> Ошибка\n{detail}\n")
}

pub fn status_message(probe: &ApiProbe, app: &App, checked_at: DateTime<FixedOffset>) -> String {
    let mut msg = String::from("📊 <b>Состояние API Wildberries</b>\n\n");
    msg.push_str(&endpoint_line("API статистики", &probe.statistics));
    msg.push('\n');
    msg.push_str(&endpoint_line("API отзывов", &probe.feedback));
    msg.push_str("\n🤖 <b>Состояние бота</b>\n");
    msg.push_str(&format!("⏰ Время проверки: {}\n", checked_at.format(DISPLAY_DATETIME)));
    msg.push_str(&format!(
        "🔄 Интервал проверки данных: {} минут\n",
        app.orders_interval_secs / 60
    ));
    msg
}

/// Appends the italic test marker.
pub fn mark_as_test(message: &str) -> String {
    format!("{message}\n\n{TEST_MARKER}")
}

pub fn sample_order() -> RawRecord {
    RawRecord::from([
        ("date", json!(Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string())),
        ("supplierArticle", json!("TEST-ARTICLE-123")),
        ("finishedPrice", json!("1500.00")),
        ("priceWithDisc", json!("1275.00")),
        ("totalPrice", json!("1350.00")),
        ("regionName", json!("Московская")),
        ("oblastOkrugName", json!("Центральный федеральный округ")),
        ("warehouseName", json!("Коледино")),
        ("warehouseType", json!("Dropoff")),
    ])
}

pub fn sample_sale() -> RawRecord {
    RawRecord::from([
        ("date", json!(Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string())),
        ("supplierArticle", json!("TEST-ARTICLE-456")),
        ("brand", json!("TestBrand")),
        ("forPay", json!("2000.00")),
        ("feeWB", json!("200.00")),
        ("finishedPrice", json!("1800.00")),
        ("regionName", json!("Санкт-Петербург")),
    ])
}

pub fn sample_feedback() -> FeedbackStatus {
    FeedbackStatus {
        has_new_feedbacks: true,
        has_new_questions: true,
        feedbacks_count: 2,
        questions_count: 1,
    }
}
