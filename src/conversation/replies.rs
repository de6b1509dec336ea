//! Outbound message texts. Users write Turkish, so replies are Turkish.

pub const COMPLETE_COMMAND: &str = "/tamamla";
pub const DELETE_COMMAND: &str = "/sil";

pub const DRAFT_SAVED: &str = "İlan detayları kaydedildi. Şimdi fotoğrafları gönderebilirsiniz. İşlem bittiğinde /tamamla komutunu kullanın.";
pub const EXTRACTION_FAILED: &str =
    "İlan detayları analiz edilemedi. Lütfen daha açıklayıcı bir şekilde tekrar giriniz.";
pub const ASK_DELETE_KEYWORD: &str = "Lütfen silmek istediğiniz klasör için bir anahtar kelime (ör: mahalle, oda tipi, vs.) giriniz.";
pub const FOLDER_NOT_FOUND: &str = "Klasör bulunamadı. Lütfen anahtar kelimeyi kontrol ediniz.";
pub const INVALID_SELECTION: &str = "Geçersiz numara. Lütfen listeden bir numara seçiniz.";
pub const NOT_A_NUMBER: &str = "Lütfen geçerli bir numara giriniz.";
pub const DELETE_OK: &str = "İlan ve ilgili klasör başarıyla silindi.";
pub const NEED_DETAILS_FIRST: &str = "Önce ilan detaylarını girmeniz gerekiyor.";
pub const NO_PHOTOS_YET: &str = "Henüz fotoğraf yüklenmedi. Lütfen önce fotoğraf gönderin.";
pub const NEED_ONE_PHOTO: &str = "En az bir fotoğraf eklemeniz gerekiyor.";
pub const SAVE_FAILED: &str = "İlan kaydedilirken bir hata oluştu. Lütfen /tamamla komutunu tekrar deneyiniz.";
pub const STORAGE_FAILED: &str =
    "Dosya depolama alanına şu anda ulaşılamıyor. Lütfen biraz sonra tekrar deneyiniz.";
pub const SEND_PHOTO_OR_COMPLETE: &str =
    "Lütfen fotoğraf gönderin veya işlemi tamamlamak için /tamamla komutunu kullanın.";
pub const DEFAULT_PROMPT: &str =
    "İlan eklemek için ilan detaylarını giriniz. İşlem bittiğinde /tamamla komutunu kullanın.";
pub const GENERIC_FAILURE: &str = "Bir hata oluştu. Lütfen tekrar deneyiniz.";

pub fn photos_received(total: u32) -> String {
    format!(
        "Fotoğraf başarıyla yüklendi. Toplam {total} fotoğraf yüklendi. İşlem bittiğinde /tamamla komutunu kullanın."
    )
}

pub fn photos_failed(total: u32) -> String {
    format!(
        "Fotoğraf yüklenemedi. Lütfen tekrar gönderin. Şu ana kadar {total} fotoğraf yüklendi."
    )
}

pub fn listing_saved(folder_link: &str) -> String {
    format!("İlanınız başarıyla kaydedildi!\n\nDrive klasör linki: {folder_link}")
}

/// Numbered candidate list; numbering starts at 1.
pub fn folder_list(paths: &[String]) -> String {
    let mut out = String::from("Bulunan klasörler:\n");
    for (idx, path) in paths.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", idx + 1, path));
    }
    out.push_str("\nLütfen silmek istediğiniz klasörün numarasını giriniz.");
    out
}

/// Summary for a deletion where the folder or the listing row did not go away.
pub fn delete_partial(folder_error: Option<&str>, listing_error: Option<&str>) -> String {
    let mut out = String::from("İlan silinirken hatalar oluştu:");
    if let Some(err) = folder_error {
        out.push_str(&format!("\nDrive: Klasör silinirken hata oluştu: {err}"));
    }
    if let Some(err) = listing_error {
        out.push_str(&format!("\nVeritabanı: {err}"));
    }
    out
}
