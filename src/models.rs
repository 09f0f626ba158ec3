use serde::Serialize;

/// Form body for the registry search endpoint. The portal's frontend always
/// submits the full field set; unused filters travel as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchForm {
    #[serde(rename = "_token")]
    pub token: String,
    pub cuit: String,
    pub matricula: String,
    pub tipo_filtro: String,
    #[serde(rename = "razonSocial")]
    pub razon_social: String,
    pub nombre: String,
    pub apellido: String,
    pub calle: String,
    pub altura: String,
    #[serde(rename = "cuitConsorcio")]
    pub cuit_consorcio: String,
    pub isadmin: String,
}

impl SearchForm {
    /// Search by matricula. `tipo_filtro: "1"` selects that filter mode and
    /// `isadmin` is the literal the endpoint expects, not a boolean.
    pub fn new(token: &str, matricula: &str) -> Self {
        Self {
            token: token.to_string(),
            cuit: String::new(),
            matricula: matricula.to_string(),
            tipo_filtro: "1".to_string(),
            razon_social: String::new(),
            nombre: String::new(),
            apellido: String::new(),
            calle: String::new(),
            altura: String::new(),
            cuit_consorcio: String::new(),
            isadmin: "False".to_string(),
        }
    }
}
