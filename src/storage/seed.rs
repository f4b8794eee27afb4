//! Demo seed data
//!
//! A small, deterministic brokerage used by demo mode, `intranet-cli seed`
//! and the demo reset endpoint. Ids and timestamps are fixed so that two
//! seeds are always identical. Seed users have no sign-in identity; demo
//! mode provisions its admin account separately.

use crate::storage::types::{
    AlertSeverity, BrokerageConfig, Company, ContentKind, Dataset, Delegation, Department,
    DepartmentContent, NavigationShortcut, News, Product, ProductCategory, Role, SystemAlert,
    User, UserRole,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

fn id(n: u128) -> Uuid {
    Uuid::from_u128(0x1000_0000_0000_4000_8000_0000_0000_0000 | n)
}

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Timestamp `n` minutes after the seed epoch
fn at(n: i64) -> DateTime<Utc> {
    epoch() + Duration::minutes(n)
}

/// Build the demo dataset
pub fn demo_dataset() -> Dataset {
    let mut data = Dataset::new();
    // Serializing these plain structs cannot fail
    let _ = fill(&mut data);
    data
}

fn fill(data: &mut Dataset) -> Result<(), serde_json::Error> {
    let mut terminology = BTreeMap::new();
    terminology.insert("delegations".to_string(), "Oficinas".to_string());
    terminology.insert("delegation".to_string(), "Oficina".to_string());

    data.push(&BrokerageConfig {
        id: Uuid::nil(),
        name: "Correduría Demo".to_string(),
        logo_url: None,
        primary_color: Some("#1e40af".to_string()),
        secondary_color: Some("#64748b".to_string()),
        accent_color: Some("#f59e0b".to_string()),
        dark_primary_color: Some("#3b82f6".to_string()),
        dark_secondary_color: None,
        dark_accent_color: None,
        terminology,
        contact_email: Some("info@correduria-demo.example".to_string()),
        created_at: at(0),
        updated_at: at(0),
    })?;

    // Delegations
    let madrid = id(0x101);
    let valencia = id(0x102);
    for (n, (delegation_id, name, code, city)) in [
        (madrid, "Madrid Central", "MAD", "Madrid"),
        (valencia, "Valencia Puerto", "VLC", "Valencia"),
    ]
    .into_iter()
    .enumerate()
    {
        let mut delegation = Delegation::new(name, code).city(city);
        delegation.id = delegation_id;
        delegation.created_at = at(1 + n as i64);
        delegation.updated_at = delegation.created_at;
        data.push(&delegation)?;
    }

    // Departments and their pages
    let claims = id(0x201);
    let underwriting = id(0x202);
    let hr = id(0x203);
    for (n, (department_id, name, icon)) in [
        (claims, "Siniestros", "shield-alert"),
        (underwriting, "Suscripción", "file-signature"),
        (hr, "Recursos Humanos", "users"),
    ]
    .into_iter()
    .enumerate()
    {
        let mut department = Department::new(name);
        department.id = department_id;
        department.icon = Some(icon.to_string());
        department.sort_order = n as i32;
        department.created_at = at(10 + n as i64);
        department.updated_at = department.created_at;
        data.push(&department)?;
    }

    data.push(&DepartmentContent {
        id: id(0x251),
        department_id: claims,
        title: "Protocolo de apertura de siniestros".to_string(),
        content: Some("Registrar el parte en las primeras 24 horas.".to_string()),
        kind: ContentKind::Text,
        url: None,
        sort_order: 0,
        created_at: at(15),
        updated_at: at(15),
    })?;
    data.push(&DepartmentContent {
        id: id(0x252),
        department_id: hr,
        title: "Calendario laboral".to_string(),
        content: None,
        kind: ContentKind::Document,
        url: Some("/files/documents/calendario.pdf".to_string()),
        sort_order: 0,
        created_at: at(16),
        updated_at: at(16),
    })?;

    // Companies, categories, products
    let mapfre = id(0x301);
    let allianz = id(0x302);
    let axa = id(0x303);
    for (n, (company_id, name, website)) in [
        (mapfre, "Mapfre", "https://www.mapfre.es"),
        (allianz, "Allianz", "https://www.allianz.es"),
        (axa, "AXA", "https://www.axa.es"),
    ]
    .into_iter()
    .enumerate()
    {
        let mut company = Company::new(name);
        company.id = company_id;
        company.website = Some(website.to_string());
        company.created_at = at(20 + n as i64);
        company.updated_at = company.created_at;
        data.push(&company)?;
    }

    let auto = id(0x401);
    let home = id(0x402);
    let life = id(0x403);
    for (n, (category_id, name, icon)) in [
        (auto, "Auto", "car"),
        (home, "Hogar", "home"),
        (life, "Vida", "heart"),
    ]
    .into_iter()
    .enumerate()
    {
        let mut category = ProductCategory::new(name);
        category.id = category_id;
        category.icon = Some(icon.to_string());
        category.sort_order = n as i32;
        category.created_at = at(30 + n as i64);
        category.updated_at = category.created_at;
        data.push(&category)?;
    }

    for (n, (product_id, name, company_id, category_id)) in [
        (id(0x501), "Auto Todo Riesgo", mapfre, auto),
        (id(0x502), "Hogar Confort", allianz, home),
        (id(0x503), "Vida Protección", axa, life),
        (id(0x504), "Auto Terceros", axa, auto),
    ]
    .into_iter()
    .enumerate()
    {
        let mut product = Product::new(name, company_id, category_id);
        product.id = product_id;
        product.created_at = at(40 + n as i64);
        product.updated_at = product.created_at;
        data.push(&product)?;
    }

    // People
    let people = [
        (id(0x601), "laura.martin@correduria-demo.example", "Laura", "Martín", Some(madrid), Some(underwriting), Role::Manager),
        (id(0x602), "javier.ruiz@correduria-demo.example", "Javier", "Ruiz", Some(madrid), Some(claims), Role::User),
        (id(0x603), "marta.soler@correduria-demo.example", "Marta", "Soler", Some(valencia), Some(hr), Role::User),
    ];
    for (n, (user_id, email, first, last, delegation_id, department_id, role)) in
        people.into_iter().enumerate()
    {
        let created = at(50 + n as i64);
        data.push(&User {
            id: user_id,
            email: email.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            phone: None,
            position: None,
            avatar_url: None,
            delegation_id,
            department_id,
            is_active: true,
            created_at: created,
            updated_at: created,
        })?;
        data.push(&UserRole {
            id: id(0x651 + n as u128),
            user_id,
            role,
            created_at: created,
            updated_at: created,
        })?;
    }

    // Communication
    let mut news = News::new(
        "Nuevo acuerdo con Mapfre",
        "Desde este mes ofrecemos condiciones mejoradas en Auto Todo Riesgo.",
    );
    news.id = id(0x701);
    news.summary = Some("Mejores condiciones en auto".to_string());
    news.published = true;
    news.published_at = Some(at(60));
    news.author_id = Some(id(0x601));
    news.company_ids = vec![mapfre];
    news.category_ids = vec![auto];
    news.product_ids = vec![id(0x501)];
    news.created_at = at(60);
    news.updated_at = at(60);
    data.push(&news)?;

    let mut draft = News::new("Borrador: campaña de vida", "Pendiente de revisión.");
    draft.id = id(0x702);
    draft.category_ids = vec![life];
    draft.created_at = at(61);
    draft.updated_at = at(61);
    data.push(&draft)?;

    data.push(&SystemAlert {
        id: id(0x801),
        title: "Mantenimiento programado".to_string(),
        message: "El tarificador no estará disponible el sábado de 8:00 a 10:00.".to_string(),
        severity: AlertSeverity::Warning,
        is_active: true,
        starts_at: None,
        ends_at: None,
        created_at: at(70),
        updated_at: at(70),
    })?;

    for (n, (title, url, icon)) in [
        ("Tarificador", "https://tarificador.example", "calculator"),
        ("Correo", "https://mail.example", "mail"),
    ]
    .into_iter()
    .enumerate()
    {
        data.push(&NavigationShortcut {
            id: id(0x901 + n as u128),
            title: title.to_string(),
            url: url.to_string(),
            icon: Some(icon.to_string()),
            sort_order: n as i32,
            is_active: true,
            created_at: at(80 + n as i64),
            updated_at: at(80 + n as i64),
        })?;
    }

    Ok(())
}
