use regex::Regex;
use std::sync::OnceLock;

/// One chapter of a plain-text book. `title` is `None` for chapters cut on blank lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: Option<String>,
    pub paragraphs: Vec<String>,
}

const MAX_HEADING_CHARS: usize = 60;

/// Number words accepted after "Chapter"/"Part"/"Book".
const NUMBER_WORDS: &str = "one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|\
     thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|\
     (twenty|thirty|forty|fifty|sixty|seventy|eighty|ninety)(-(one|two|three|four|five|six|seven|eight|nine))?";

fn heading_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            // English headings end after the number or continue only past a separator
            let pattern = format!(
                r"(?i)^(第[0-9０-９零〇一二两三四五六七八九十百千万]+[章节回卷部篇集]|(chapter|part|book)\s+([0-9]+|[ivxlc]+|{})(\s*[:.\-\x{{2013}}\x{{2014}}]\s*.*)?$|序章|序言|楔子|引子|尾声|后记|番外)",
                NUMBER_WORDS
            );
            Regex::new(&pattern).ok()
        })
        .as_ref()
}

pub fn is_heading(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && trimmed.chars().count() <= MAX_HEADING_CHARS
        && heading_pattern().is_some_and(|re| re.is_match(trimmed))
}

/// Split text into chapters.
///
/// With at least two heading lines ("第N章", "Chapter N", ...) the text is cut at
/// each heading; anything before the first heading becomes a leading chapter.
/// Otherwise every blank-line-delimited block is a chapter.
pub fn split_chapters(text: &str) -> Vec<Chapter> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.lines().collect();

    let heading_count = lines.iter().filter(|l| is_heading(l)).count();
    let chapters = if heading_count >= 2 {
        split_on_headings(&lines)
    } else {
        split_on_blank_lines(&lines)
    };

    if chapters.is_empty() {
        vec![Chapter {
            title: None,
            paragraphs: Vec::new(),
        }]
    } else {
        chapters
    }
}

fn split_on_headings(lines: &[&str]) -> Vec<Chapter> {
    let mut chapters = Vec::new();
    let mut current = Chapter {
        title: None,
        paragraphs: Vec::new(),
    };

    for line in lines {
        if is_heading(line) {
            if current.title.is_some() || !current.paragraphs.is_empty() {
                chapters.push(current);
            }
            current = Chapter {
                title: Some(line.trim().to_string()),
                paragraphs: Vec::new(),
            };
        } else {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                current.paragraphs.push(trimmed.to_string());
            }
        }
    }
    if current.title.is_some() || !current.paragraphs.is_empty() {
        chapters.push(current);
    }
    chapters
}

fn split_on_blank_lines(lines: &[&str]) -> Vec<Chapter> {
    let mut chapters = Vec::new();
    let mut block: Vec<String> = Vec::new();

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !block.is_empty() {
                chapters.push(Chapter {
                    title: None,
                    paragraphs: std::mem::take(&mut block),
                });
            }
        } else {
            block.push(trimmed.to_string());
        }
    }
    if !block.is_empty() {
        chapters.push(Chapter {
            title: None,
            paragraphs: block,
        });
    }
    chapters
}

/// Merge adjacent chapters in even groups so at most `cap` remain. Order is kept.
pub fn cap_chapters(chapters: Vec<Chapter>, cap: usize) -> Vec<Chapter> {
    let cap = cap.max(1);
    if chapters.len() <= cap {
        return chapters;
    }

    let group_size = chapters.len().div_ceil(cap);
    chapters
        .chunks(group_size)
        .map(|group| Chapter {
            title: group.iter().find_map(|c| c.title.clone()),
            paragraphs: group
                .iter()
                .flat_map(|c| {
                    // Keep merged headings visible inside the body
                    let heading = c.title.iter().cloned();
                    heading.chain(c.paragraphs.iter().cloned())
                })
                .skip(usize::from(group[0].title.is_some()))
                .collect(),
        })
        .collect()
}

/// Display title for the chapter at `index` (zero-based).
pub fn chapter_title(chapter: &Chapter, index: usize) -> String {
    chapter
        .title
        .clone()
        .unwrap_or_else(|| format!("Chapter {}", index + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(n: usize) -> String {
        (0..n)
            .map(|i| format!("Paragraph {} line one.\nParagraph {} line two.", i, i))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn test_blank_line_blocks_become_chapters() {
        let chapters = split_chapters(&blocks(7));
        assert_eq!(chapters.len(), 7);
        assert_eq!(chapters[3].paragraphs[0], "Paragraph 3 line one.");
        assert!(chapters.iter().all(|c| c.title.is_none()));
    }

    #[test]
    fn test_heading_detection_chinese_and_english() {
        assert!(is_heading("第一章 风起"));
        assert!(is_heading("  第12回  "));
        assert!(is_heading("Chapter 3: The Return"));
        assert!(is_heading("CHAPTER IV"));
        assert!(is_heading("楔子"));
        assert!(!is_heading("He read chapter after chapter of the book until the candle died out at last."));
        assert!(!is_heading("Just a sentence."));
        assert!(is_heading("Part Two"));
        assert!(is_heading("Book twenty-one - The Return"));
        assert!(is_heading("Chapter 7"));
        assert!(!is_heading("Part of me wanted to stay."));
        assert!(!is_heading("Book by book she sorted the shelf."));
        assert!(!is_heading("Chapter one of the plan was simple"));
        assert!(!is_heading("Part mid way through the night"));
    }

    #[test]
    fn test_prose_starting_with_heading_words_stays_in_blocks() {
        let text = "Part of me wanted to stay.\nIt was late.\n\n\
                    Book by book she sorted the shelf.\nThen she slept.\n\n\
                    A third block.";
        let chapters = split_chapters(text);
        assert_eq!(chapters.len(), 3);
        assert!(chapters.iter().all(|c| c.title.is_none()));
        assert_eq!(chapters[0].paragraphs[0], "Part of me wanted to stay.");
        assert_eq!(chapters[2].paragraphs, vec!["A third block."]);
    }

    #[test]
    fn test_split_on_headings_keeps_preface() {
        let text = "某某著\n\n第一章 开始\n正文一\n\n正文二\n第二章 继续\n正文三\n";
        let chapters = split_chapters(text);
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].title, None);
        assert_eq!(chapters[0].paragraphs, vec!["某某著"]);
        assert_eq!(chapters[1].title.as_deref(), Some("第一章 开始"));
        assert_eq!(chapters[1].paragraphs, vec!["正文一", "正文二"]);
        assert_eq!(chapters[2].paragraphs, vec!["正文三"]);
    }

    #[test]
    fn test_single_heading_falls_back_to_blocks() {
        let text = "Chapter 1\nfirst\n\nsecond\n\nthird";
        let chapters = split_chapters(text);
        assert_eq!(chapters.len(), 3);
    }

    #[test]
    fn test_empty_text_yields_one_chapter() {
        let chapters = split_chapters("   \n\n  ");
        assert_eq!(chapters.len(), 1);
        assert!(chapters[0].paragraphs.is_empty());
    }

    #[test]
    fn test_cap_merges_120_blocks_into_contiguous_groups() {
        let chapters = split_chapters(&blocks(120));
        assert_eq!(chapters.len(), 120);

        let capped = cap_chapters(chapters, 50);
        assert!(capped.len() <= 50);
        assert_eq!(capped.len(), 40);

        // Every merged chapter holds three original blocks in order
        for (i, chapter) in capped.iter().enumerate() {
            assert_eq!(chapter.paragraphs.len(), 6);
            assert_eq!(chapter.paragraphs[0], format!("Paragraph {} line one.", i * 3));
            assert_eq!(chapter.paragraphs[5], format!("Paragraph {} line two.", i * 3 + 2));
        }
    }

    #[test]
    fn test_cap_never_exceeded() {
        for n in [1usize, 49, 50, 51, 99, 100, 101, 777, 2500] {
            let chapters: Vec<Chapter> = (0..n)
                .map(|i| Chapter {
                    title: None,
                    paragraphs: vec![i.to_string()],
                })
                .collect();
            let capped = cap_chapters(chapters, 50);
            assert!(capped.len() <= 50, "{} chapters produced {}", n, capped.len());
            let flattened: Vec<String> = capped.into_iter().flat_map(|c| c.paragraphs).collect();
            let expected: Vec<String> = (0..n).map(|i| i.to_string()).collect();
            assert_eq!(flattened, expected);
        }
    }

    #[test]
    fn test_cap_keeps_heading_titles() {
        let chapters: Vec<Chapter> = (1..=4)
            .map(|i| Chapter {
                title: Some(format!("第{}章", i)),
                paragraphs: vec![format!("text {}", i)],
            })
            .collect();
        let capped = cap_chapters(chapters, 2);
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].title.as_deref(), Some("第1章"));
        assert_eq!(capped[0].paragraphs, vec!["text 1", "第2章", "text 2"]);
        assert_eq!(chapter_title(&capped[1], 1), "第3章");
    }
}
