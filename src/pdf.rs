use crate::models::Lead;
use printpdf::*;
use std::io::BufWriter;

/// Text-only lead dossier for the sales team. The builtin Helvetica font
/// cannot carry Vietnamese diacritics, so all text is folded to ASCII.
pub fn design_dossier(lead: &Lead) -> Vec<u8> {
    let (doc, page, layer) = PdfDocument::new(
        format!("Design Lead {}", lead.id),
        Mm(210.0),
        Mm(297.0),
        "Layer 1",
    );
    let font = doc.add_builtin_font(BuiltinFont::Helvetica).unwrap();
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).unwrap();
    let sheet = doc.get_page(page).get_layer(layer);

    sheet.use_text("Interior Design Lead", 20.0, Mm(15.0), Mm(275.0), &bold);
    sheet.use_text(format!("Lead ID: {}", lead.id), 10.0, Mm(15.0), Mm(263.0), &font);
    sheet.use_text(
        format!("Captured: {}", lead.created_at.format("%Y-%m-%d %H:%M UTC")),
        10.0,
        Mm(15.0),
        Mm(257.0),
        &font,
    );

    sheet.use_text("Contact", 14.0, Mm(15.0), Mm(242.0), &bold);
    sheet.use_text(
        format!("Name:  {}", truncate(&fold_ascii(&lead.contact.name), 80)),
        11.0,
        Mm(15.0),
        Mm(233.0),
        &font,
    );
    sheet.use_text(format!("Phone: {}", truncate(&lead.contact.phone, 40)), 11.0, Mm(15.0), Mm(226.0), &font);
    sheet.use_text(format!("Email: {}", truncate(&lead.contact.email, 80)), 11.0, Mm(15.0), Mm(219.0), &font);

    sheet.use_text("Request", 14.0, Mm(15.0), Mm(204.0), &bold);
    let styles = lead
        .request
        .styles
        .iter()
        .map(|s| fold_ascii(s.label()))
        .collect::<Vec<_>>()
        .join(", ");
    sheet.use_text(format!("Styles: {}", truncate(&styles, 100)), 11.0, Mm(15.0), Mm(195.0), &font);
    sheet.use_text(
        format!("Budget: {}", fold_ascii(lead.request.budget.label())),
        11.0,
        Mm(15.0),
        Mm(188.0),
        &font,
    );
    match lead.chosen_index {
        Some(index) => sheet.use_text(
            format!("Chosen option: Phuong an {}", index + 1),
            11.0,
            Mm(15.0),
            Mm(181.0),
            &font,
        ),
        None => sheet.use_text("Chosen option: none", 11.0, Mm(15.0), Mm(181.0), &font),
    }

    sheet.use_text("(Room photo and renders not embedded)", 8.0, Mm(15.0), Mm(166.0), &font);

    let mut buf: Vec<u8> = Vec::new();
    {
        let mut writer = BufWriter::new(&mut buf);
        doc.save(&mut writer).ok();
    }
    buf
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max).collect::<String>())
    }
}

/// Fold Vietnamese letters onto their ASCII base.
fn fold_ascii(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'á' | 'à' | 'ả' | 'ã' | 'ạ' | 'ă' | 'ắ' | 'ằ' | 'ẳ' | 'ẵ' | 'ặ' | 'â' | 'ấ'
            | 'ầ' | 'ẩ' | 'ẫ' | 'ậ' => 'a',
            'Á' | 'À' | 'Ả' | 'Ã' | 'Ạ' | 'Ă' | 'Ắ' | 'Ằ' | 'Ẳ' | 'Ẵ' | 'Ặ' | 'Â' | 'Ấ'
            | 'Ầ' | 'Ẩ' | 'Ẫ' | 'Ậ' => 'A',
            'é' | 'è' | 'ẻ' | 'ẽ' | 'ẹ' | 'ê' | 'ế' | 'ề' | 'ể' | 'ễ' | 'ệ' => 'e',
            'É' | 'È' | 'Ẻ' | 'Ẽ' | 'Ẹ' | 'Ê' | 'Ế' | 'Ề' | 'Ể' | 'Ễ' | 'Ệ' => 'E',
            'í' | 'ì' | 'ỉ' | 'ĩ' | 'ị' => 'i',
            'Í' | 'Ì' | 'Ỉ' | 'Ĩ' | 'Ị' => 'I',
            'ó' | 'ò' | 'ỏ' | 'õ' | 'ọ' | 'ô' | 'ố' | 'ồ' | 'ổ' | 'ỗ' | 'ộ' | 'ơ' | 'ớ'
            | 'ờ' | 'ở' | 'ỡ' | 'ợ' => 'o',
            'Ó' | 'Ò' | 'Ỏ' | 'Õ' | 'Ọ' | 'Ô' | 'Ố' | 'Ồ' | 'Ổ' | 'Ỗ' | 'Ộ' | 'Ơ' | 'Ớ'
            | 'Ờ' | 'Ở' | 'Ỡ' | 'Ợ' => 'O',
            'ú' | 'ù' | 'ủ' | 'ũ' | 'ụ' | 'ư' | 'ứ' | 'ừ' | 'ử' | 'ữ' | 'ự' => 'u',
            'Ú' | 'Ù' | 'Ủ' | 'Ũ' | 'Ụ' | 'Ư' | 'Ứ' | 'Ừ' | 'Ử' | 'Ữ' | 'Ự' => 'U',
            'ý' | 'ỳ' | 'ỷ' | 'ỹ' | 'ỵ' => 'y',
            'Ý' | 'Ỳ' | 'Ỷ' | 'Ỹ' | 'Ỵ' => 'Y',
            'đ' => 'd',
            'Đ' => 'D',
            other => other,
        })
        .collect()
}
