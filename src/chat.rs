use chrono::Utc;
use sqlx::SqlitePool;

use crate::config::{ChatSettings, CitationMode};
use crate::conversations;
use crate::error::AppResult;
use crate::inference::CompletionClient;
use crate::model::{ChatTurn, UserSummary};
use crate::notes;

const PERSONA: &str = r#"Tu es l'assistante de "Couple Memory", une application utilisée par Wendy et Daniel pour se souvenir de leurs préférences, demandes et limites dans leur relation.

CONTEXTE :
Tu reçois toujours :
1. Toutes les notes enregistrées, formatées comme : "Wendy - [contenu]" ou "Daniel - [contenu]"
2. Le nom de l'utilisateur actuellement connecté (Wendy ou Daniel)
3. Sa question, éventuellement précédée de l'historique de la conversation

TON RÔLE :
- Analyser les notes pour répondre aux questions
- Comprendre les pronoms selon qui parle :
  * Si Wendy demande "Est-ce que je lui ai déjà dit X ?" → "je" = Wendy, "lui" = Daniel
  * Si Daniel demande "Est-ce qu'elle m'a déjà demandé Y ?" → "elle" = Wendy, "moi" = Daniel
- Répondre de manière claire et directe"#;

const STRICT_RULES: &str = r#"
- TOUJOURS citer l'extrait exact de la note quand tu références quelque chose
- Si aucune note ne correspond : le dire clairement, ne JAMAIS inventer

RÈGLES STRICTES :
- Utilise UNIQUEMENT les notes fournies en contexte
- Ne crée jamais de faux souvenirs
- Si une information n'existe pas dans les notes, dis-le explicitement
- Reste neutre et bienveillante
- Réponds en français
- Format tes réponses de manière conversationnelle et naturelle"#;

const RELAXED_RULES: &str = r#"
- Cite une note quand cela aide à comprendre ta réponse, en la reformulant si besoin
- Si aucune note ne correspond, dis-le simplement

RÈGLES :
- Appuie-toi sur les notes fournies et sur la conversation en cours
- N'invente pas de souvenirs
- Reste neutre et bienveillante
- Réponds en français, de manière conversationnelle et naturelle"#;

const NO_NOTES: &str = "Aucune note enregistrée.";

pub fn system_prompt(mode: CitationMode) -> String {
    let rules = match mode {
        CitationMode::Strict => STRICT_RULES,
        CitationMode::Relaxed => RELAXED_RULES,
    };
    format!("{PERSONA}{rules}")
}

/// The final user turn: notes, who is asking, then the question.
pub fn user_prompt(notes_context: &str, asking: &UserSummary, question: &str) -> String {
    let notes_context = match notes_context.trim() {
        "" => NO_NOTES,
        context => context,
    };
    format!(
        "NOTES ENREGISTRÉES :\n{notes_context}\n\nUTILISATEUR CONNECTÉ : {}\n\nQUESTION : {question}",
        asking.name
    )
}

pub struct ChatRequest<'a> {
    pub question: &'a str,
    /// Pre-formatted notes; built from the note store when absent or blank.
    pub notes_context: Option<&'a str>,
    pub history: &'a [ChatTurn],
    pub save: bool,
    pub conversation_id: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOutcome {
    pub reply: String,
    pub conversation_id: Option<String>,
}

/// Asks the model and, when saving is requested and allowed, records the
/// question and the reply in the asker's conversation.
pub async fn ask(
    db: &SqlitePool,
    client: &dyn CompletionClient,
    settings: &ChatSettings,
    asking: &UserSummary,
    request: ChatRequest<'_>,
) -> AppResult<ChatOutcome> {
    let notes_context = match request.notes_context.filter(|c| !c.trim().is_empty()) {
        Some(context) => context.to_owned(),
        None => notes::format_context(&notes::list(db, Utc::now()).await?),
    };

    let persist = request.save && settings.persistence;
    if request.save && !settings.persistence {
        log::debug!("saving requested by {} but persistence is disabled", asking.name);
    }

    // Resolved before the model is called so a stale id never costs a reply.
    let target = match request.conversation_id {
        Some(id) if persist => match conversations::find(db, id, &asking.id).await? {
            Some(conversation) => Some(conversation.id),
            None => {
                log::info!(
                    "conversation {id} is gone or not owned by {}, starting a new one",
                    asking.name
                );
                None
            }
        },
        _ => None,
    };

    let mut turns = request.history.to_vec();
    turns.push(ChatTurn::user(user_prompt(&notes_context, asking, request.question)));

    let reply = client
        .complete(&system_prompt(settings.citations), &turns)
        .await?;

    if !persist {
        return Ok(ChatOutcome {
            reply,
            conversation_id: None,
        });
    }

    let exchange = [ChatTurn::user(request.question), ChatTurn::assistant(reply.clone())];
    let conversation_id = conversations::upsert_and_append(
        db,
        target.as_deref(),
        &asking.id,
        None,
        &exchange,
        Utc::now(),
    )
    .await?;

    Ok(ChatOutcome {
        reply,
        conversation_id: Some(conversation_id),
    })
}
