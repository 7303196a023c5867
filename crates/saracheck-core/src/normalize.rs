//! Canonical keys for identifiers, names, amounts and dates.
//!
//! Both registers describe the same buyers and winners with different
//! spellings. Every function here is pure and deterministic: the same input
//! always yields the same key, and `None` means "unparseable", which later
//! stages read as "no candidate" for strategies needing that field.
//!
//! # Spanish register conventions
//!
//! - Tax IDs (NIF/CIF) are 9 characters, often written with dots, dashes or a
//!   leading `ES` VAT prefix in TED: `ES-B12.345.678` → `B12345678`
//! - Company names carry legal-form suffixes in many spellings:
//!   `S.L.`, `S. L.`, `SL`, `Sociedad Limitada` all mean the same thing
//! - Amounts are exported as `1.234.567,89 €` (dot thousands, comma decimals)
//! - Dates arrive as ISO `2019-03-04`, `04/03/2019` or compact `20190304`

use chrono::NaiveDate;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::model::{BuyerTier, ContractCategory};
use crate::money::Cents;

/// Legal-form suffixes stripped from the end of organisation names, longest
/// first so that `SOCIEDAD ANONIMA DEPORTIVA` wins over `SOCIEDAD ANONIMA`.
const LEGAL_SUFFIXES: &[&[&str]] = &[
    &["SOCIEDAD", "LIMITADA", "NUEVA", "EMPRESA"],
    &["AGRUPACION", "DE", "INTERES", "ECONOMICO"],
    &["SOCIEDAD", "ANONIMA", "DEPORTIVA"],
    &["SOCIEDAD", "LIMITADA", "PROFESIONAL"],
    &["SOCIEDAD", "LIMITADA", "LABORAL"],
    &["SOCIEDAD", "COOPERATIVA", "ANDALUZA"],
    &["SOCIEDAD", "CIVIL", "PROFESIONAL"],
    &["SOCIEDAD", "ANONIMA"],
    &["SOCIEDAD", "LIMITADA"],
    &["SOCIEDAD", "COOPERATIVA"],
    &["SOCIEDAD", "CIVIL"],
    &["SOCIEDAD", "UNIPERSONAL"],
    &["S", "COOP"],
    &["SAU"],
    &["SLU"],
    &["SAD"],
    &["SLL"],
    &["SLP"],
    &["SLNE"],
    &["SAE"],
    &["SME"],
    &["SA"],
    &["SL"],
    &["SC"],
    &["SCA"],
    &["SCCL"],
    &["SCOOP"],
    &["SE"],
    &["SRL"],
    &["AIE"],
    &["UTE"],
];

/// Uppercase and strip diacritics, keeping `Ñ` distinct from `N`.
pub fn fold_diacritics(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.to_uppercase().chars() {
        if c == 'Ñ' {
            out.push('Ñ');
            continue;
        }
        out.extend(std::iter::once(c).nfd().filter(|d| !is_combining_mark(*d)));
    }
    out
}

/// Canonical organisation name.
///
/// `Construcciones Pérez, S.A. (Grupo X)` → `CONSTRUCCIONES PEREZ`
pub fn org_name(s: &str) -> Option<String> {
    let folded = fold_diacritics(s);

    // Drop parenthesised asides.
    let mut depth = 0usize;
    let mut stripped = String::with_capacity(folded.len());
    for c in folded.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }

    let raw_tokens: Vec<&str> = stripped
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    // Collapse runs of single letters: S.A.U. → SAU, S L → SL.
    let mut tokens: Vec<String> = Vec::with_capacity(raw_tokens.len());
    let mut run = String::new();
    let mut run_len = 0usize;
    for tok in raw_tokens {
        let single_letter = tok.chars().count() == 1 && tok.chars().all(char::is_alphabetic);
        if single_letter {
            run.push_str(tok);
            run_len += 1;
            continue;
        }
        flush_run(&mut tokens, &mut run, &mut run_len);
        tokens.push(tok.to_string());
    }
    flush_run(&mut tokens, &mut run, &mut run_len);

    // Strip legal forms from the end until none apply, keeping at least one token.
    loop {
        let hit = LEGAL_SUFFIXES.iter().find(|suffix| {
            tokens.len() > suffix.len()
                && tokens[tokens.len() - suffix.len()..]
                    .iter()
                    .zip(suffix.iter())
                    .all(|(a, b)| a == b)
        });
        match hit {
            Some(suffix) => tokens.truncate(tokens.len() - suffix.len()),
            None => break,
        }
    }

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

fn flush_run(tokens: &mut Vec<String>, run: &mut String, run_len: &mut usize) {
    if *run_len > 0 {
        tokens.push(std::mem::take(run));
    }
    *run_len = 0;
}

/// Canonical tax identifier: ASCII alphanumerics, uppercase, no `ES` prefix.
///
/// Keys must be 8–14 characters with at least one digit; placeholders such
/// as `NO CONSTA` are rejected.
pub fn tax_id(s: &str) -> Option<String> {
    let mut key: String = s
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if key.len() == 11 && key.starts_with("ES") {
        key.drain(..2);
    }
    let valid = (8..=14).contains(&key.len()) && key.bytes().any(|b| b.is_ascii_digit());
    valid.then_some(key)
}

/// Canonical case number (expediente / TED file reference).
///
/// Uppercase alphanumerics only. At least three characters including one
/// digit, so placeholders like `S/N` never join.
pub fn case_number(s: &str) -> Option<String> {
    let key: String = fold_diacritics(s)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    let valid = key.chars().count() >= 3 && key.chars().any(|c| c.is_ascii_digit());
    valid.then_some(key)
}

/// CPV code reduced to its 8-digit stem: `33600000-6` → `33600000`.
pub fn cpv(s: &str) -> Option<String> {
    let digits: String = s
        .split('-')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .take(8)
        .collect();
    (digits.len() >= 2).then_some(digits)
}

fn label(s: &str) -> String {
    fold_diacritics(s.trim())
        .replace(['_', '-', '.'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Contract category from register text, TED codes or PLACSP type codes.
pub fn category(s: &str) -> Option<ContractCategory> {
    let l = label(s);
    let cat = match l.as_str() {
        "W" | "OBRAS" | "OBRA" | "WORKS" | "3" | "31" | "32" | "CONCESION DE OBRAS"
        | "CONCESION DE OBRAS PUBLICAS" => ContractCategory::Works,
        "S" | "SERVICIOS" | "SERVICIO" | "SERVICES" | "2" | "21" | "22"
        | "CONCESION DE SERVICIOS" | "GESTION DE SERVICIOS PUBLICOS" => {
            ContractCategory::Services
        }
        "U" | "SUMINISTROS" | "SUMINISTRO" | "SUPPLIES" | "SUPPLY" | "1" => {
            ContractCategory::Supplies
        }
        "SECTORES ESPECIALES" | "SECTOR ESPECIAL" | "SPECIAL SECTOR" | "UTILITIES" => {
            ContractCategory::SpecialSector
        }
        _ => return None,
    };
    Some(cat)
}

/// Buyer tier from register text or PLACSP contracting-party codes.
pub fn buyer_tier(s: &str) -> Option<BuyerTier> {
    let l = label(s);
    let tier = match l.as_str() {
        "CENTRAL" | "CENTRAL GOVERNMENT" | "AGE" | "ESTADO"
        | "ADMINISTRACION GENERAL DEL ESTADO" | "1" => BuyerTier::CentralGovernment,
        "OTHER" | "OTRO" | "OTROS" | "REGIONAL" | "LOCAL" | "COMUNIDAD AUTONOMA"
        | "ADMINISTRACION AUTONOMICA" | "ENTIDAD LOCAL" | "ADMINISTRACION LOCAL"
        | "ENTIDAD DE DERECHO PUBLICO" | "OTRAS ENTIDADES DEL SECTOR PUBLICO" | "2" | "3"
        | "4" | "5" => BuyerTier::Other,
        _ => return None,
    };
    Some(tier)
}

/// Parse a textual euro amount into cents without going through floats.
///
/// A comma is the decimal separator when present; otherwise a single dot
/// followed by exactly three digits is read as a thousands separator.
pub fn parse_amount(s: &str) -> Option<Cents> {
    let cleaned: String = s
        .trim()
        .trim_end_matches("EUR")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '€')
        .collect();
    if cleaned.is_empty() || cleaned.starts_with('-') {
        return None;
    }

    let canonical = if cleaned.contains(',') {
        cleaned.replace('.', "").replacen(',', ".", 1)
    } else {
        let dots = cleaned.matches('.').count();
        let three_after_dot = cleaned
            .rsplit_once('.')
            .is_some_and(|(_, frac)| frac.len() == 3);
        if dots > 1 || (dots == 1 && three_after_dot) {
            cleaned.replace('.', "")
        } else {
            cleaned
        }
    };

    let (int_part, frac_part) = canonical.split_once('.').unwrap_or((&canonical, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let whole: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };
    let frac = frac_part.as_bytes();
    let digit = |i: usize| frac.get(i).map_or(0, |b| i64::from(b - b'0'));
    let mut cents = digit(0) * 10 + digit(1);
    if digit(2) >= 5 {
        cents += 1;
    }
    whole.checked_mul(100)?.checked_add(cents).map(Cents::new)
}

/// Parse a calendar date in any of the formats the two registers emit.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.len() >= 10 && s.as_bytes().get(4) == Some(&b'-') {
        return NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok();
    }
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(s, "%Y%m%d").ok();
    }
    let head = s.split_whitespace().next()?;
    NaiveDate::parse_from_str(head, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(head, "%d-%m-%Y"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_name_strips_legal_forms() {
        assert_eq!(org_name("MARFINA SL (MOVENTIS)").as_deref(), Some("MARFINA"));
        assert_eq!(
            org_name("Construcciones Pérez, S.A. Sociedad Unipersonal").as_deref(),
            Some("CONSTRUCCIONES PEREZ")
        );
        assert_eq!(org_name("Limpiezas Norte S. L. U.").as_deref(), Some("LIMPIEZAS NORTE"));
        assert_eq!(
            org_name("ACME SOCIEDAD ANONIMA DEPORTIVA").as_deref(),
            Some("ACME")
        );
        assert_eq!(org_name("Agraria Sur S. Coop.").as_deref(), Some("AGRARIA SUR"));
    }

    #[test]
    fn org_name_spellings_converge() {
        let variants = [
            "Talleres Ibéricos, S.L.",
            "TALLERES IBERICOS SL",
            "talleres ibericos sociedad limitada",
            "Talleres  Ibéricos S L",
        ];
        let keys: Vec<_> = variants.iter().map(|v| org_name(v)).collect();
        assert!(keys.iter().all(|k| k.as_deref() == Some("TALLERES IBERICOS")), "{keys:?}");
    }

    #[test]
    fn org_name_keeps_enie() {
        assert_eq!(
            org_name("Compañía Española de Obras").as_deref(),
            Some("COMPAÑIA ESPAÑOLA DE OBRAS")
        );
        assert_ne!(org_name("Peña"), org_name("Pena"));
    }

    #[test]
    fn org_name_never_strips_to_nothing() {
        assert_eq!(org_name("S.A.").as_deref(), Some("SA"));
        assert_eq!(org_name(" - ., "), None);
        assert_eq!(org_name(""), None);
    }

    #[test]
    fn tax_id_formatting_removed() {
        assert_eq!(tax_id("b-12.345.678").as_deref(), Some("B12345678"));
        assert_eq!(tax_id("ES B12345678").as_deref(), Some("B12345678"));
        assert_eq!(tax_id("Q2826000H").as_deref(), Some("Q2826000H"));
        // Not a Spanish VAT prefix when it would leave a short key.
        assert_eq!(tax_id("ES1234567").as_deref(), Some("ES1234567"));
    }

    #[test]
    fn tax_id_rejects_placeholders() {
        assert_eq!(tax_id("NO CONSTA"), None);
        assert_eq!(tax_id("123"), None);
        assert_eq!(tax_id(""), None);
        assert_eq!(tax_id("123456789012345"), None);
    }

    #[test]
    fn case_number_keys() {
        assert_eq!(case_number("Exp. 2019/045-A").as_deref(), Some("EXP2019045A"));
        assert_eq!(case_number("S/N"), None);
        assert_eq!(case_number("ABCDEF"), None);
    }

    #[test]
    fn cpv_stem() {
        assert_eq!(cpv("33600000-6").as_deref(), Some("33600000"));
        assert_eq!(cpv("85"), Some("85".to_string()));
        assert_eq!(cpv("x"), None);
    }

    #[test]
    fn categories_from_both_registers() {
        assert_eq!(category("Obras"), Some(ContractCategory::Works));
        assert_eq!(category("W"), Some(ContractCategory::Works));
        assert_eq!(category("Servicios"), Some(ContractCategory::Services));
        assert_eq!(category("services"), Some(ContractCategory::Services));
        assert_eq!(category("Suministros"), Some(ContractCategory::Supplies));
        assert_eq!(category("U"), Some(ContractCategory::Supplies));
        assert_eq!(category("special-sector"), Some(ContractCategory::SpecialSector));
        assert_eq!(category("Sectores Especiales"), Some(ContractCategory::SpecialSector));
        assert_eq!(category("Gestión de Servicios Públicos"), Some(ContractCategory::Services));
        assert_eq!(category("Patrimonial"), None);
    }

    #[test]
    fn tiers() {
        assert_eq!(buyer_tier("central"), Some(BuyerTier::CentralGovernment));
        assert_eq!(
            buyer_tier("Administración General del Estado"),
            Some(BuyerTier::CentralGovernment)
        );
        assert_eq!(buyer_tier("central-government"), Some(BuyerTier::CentralGovernment));
        assert_eq!(buyer_tier("Comunidad Autónoma"), Some(BuyerTier::Other));
        assert_eq!(buyer_tier("other"), Some(BuyerTier::Other));
        assert_eq!(buyer_tier("?"), None);
    }

    #[test]
    fn amounts_spanish_format() {
        assert_eq!(parse_amount("1.234.567,89 €"), Some(Cents::new(123_456_789)));
        assert_eq!(parse_amount("230.000,00"), Some(Cents::from_whole_euros(230_000)));
        assert_eq!(parse_amount("230.000"), Some(Cents::from_whole_euros(230_000)));
        assert_eq!(parse_amount("99,5"), Some(Cents::new(9_950)));
    }

    #[test]
    fn amounts_plain_format() {
        assert_eq!(parse_amount("230000.5"), Some(Cents::new(23_000_050)));
        assert_eq!(parse_amount("1234567.89"), Some(Cents::new(123_456_789)));
        assert_eq!(parse_amount("42"), Some(Cents::from_whole_euros(42)));
        assert_eq!(parse_amount("10.005"), Some(Cents::from_whole_euros(10_005)));
        assert_eq!(parse_amount("0.125"), Some(Cents::from_whole_euros(125)));
        assert_eq!(parse_amount("0,125"), Some(Cents::new(13)));
        assert_eq!(parse_amount("1500 EUR"), Some(Cents::from_whole_euros(1_500)));
    }

    #[test]
    fn amounts_rejected() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("-5"), None);
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(parse_amount("1,2,3"), None);
        assert_eq!(parse_amount("€"), None);
    }

    #[test]
    fn dates_in_all_formats() {
        let d = NaiveDate::from_ymd_opt(2019, 3, 4);
        assert_eq!(parse_date("2019-03-04"), d);
        assert_eq!(parse_date("2019-03-04T10:00:00+01:00"), d);
        assert_eq!(parse_date("04/03/2019"), d);
        assert_eq!(parse_date("04-03-2019"), d);
        assert_eq!(parse_date("20190304"), d);
        assert_eq!(parse_date(" 04/03/2019 00:00 "), d);
    }

    #[test]
    fn dates_rejected() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("2019-02-30"), None);
        assert_eq!(parse_date("sometime"), None);
    }

    #[test]
    fn normalisation_is_idempotent() {
        for raw in ["Hospital Universitario La Paz", "B-12345678", "EXP 12/2020"] {
            if let Some(k) = org_name(raw) {
                assert_eq!(org_name(&k).as_deref(), Some(k.as_str()));
            }
            if let Some(k) = tax_id(raw) {
                assert_eq!(tax_id(&k).as_deref(), Some(k.as_str()));
            }
            if let Some(k) = case_number(raw) {
                assert_eq!(case_number(&k).as_deref(), Some(k.as_str()));
            }
        }
    }
}
